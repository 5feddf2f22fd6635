//! Additive two-party secret sharing over `Z_F`.
//!
//! A user vector `d` is split into a server share `u`, uniform over the
//! field, and a peer share `v = d - u mod F`. Either share alone is uniformly
//! distributed and reveals nothing about `d`.

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{P4PError, Result};
use crate::field::{centered_mod, random_vector, vector_add};

/// A user's private vector, reduced into the centered field range.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UserVector {
    values: Vec<i64>,
}

impl UserVector {
    pub fn new(values: &[i64], field_modulus: i64) -> Self {
        Self {
            values: values
                .iter()
                .map(|&x| centered_mod(x as i128, field_modulus))
                .collect(),
        }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// The two shares of one user vector.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharePair {
    server: Vec<i64>,
    peer: Vec<i64>,
}

impl SharePair {
    /// The server's share `u`.
    pub fn server_share(&self) -> &[i64] {
        &self.server
    }

    /// The privacy peer's share `v`.
    pub fn peer_share(&self) -> &[i64] {
        &self.peer
    }

    pub fn dimension(&self) -> usize {
        self.server.len()
    }

    /// Recombines the shares.
    pub fn reconstruct(&self, field_modulus: i64) -> Result<Vec<i64>> {
        vector_add(&self.server, &self.peer, field_modulus)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SecretSplitter {
    field_modulus: i64,
}

impl SecretSplitter {
    pub fn new(field_modulus: i64) -> Result<Self> {
        if field_modulus < 2 {
            return Err(P4PError::Configuration(format!(
                "Field modulus {} must be at least 2",
                field_modulus
            )));
        }
        Ok(Self { field_modulus })
    }

    /// Splits `data` with a fresh uniform mask.
    pub fn split<R: RngCore + CryptoRng>(&self, data: &UserVector, rng: &mut R) -> SharePair {
        let server = random_vector(data.dimension(), self.field_modulus, rng);
        self.split_with_mask(data, server)
    }

    /// Splits `data` with a caller-chosen server share `u`. Deterministic.
    ///
    /// # Errors
    /// * `InvalidDimension` if `mask` and `data` differ in length
    pub fn split_with(&self, data: &UserVector, mask: &[i64]) -> Result<SharePair> {
        if mask.len() != data.dimension() {
            return Err(P4PError::InvalidDimension {
                expected: data.dimension(),
                got: mask.len(),
            });
        }
        let server = mask
            .iter()
            .map(|&x| centered_mod(x as i128, self.field_modulus))
            .collect();
        Ok(self.split_with_mask(data, server))
    }

    fn split_with_mask(&self, data: &UserVector, server: Vec<i64>) -> SharePair {
        let peer = data
            .values()
            .iter()
            .zip(&server)
            .map(|(&d, &u)| centered_mod(d as i128 - u as i128, self.field_modulus))
            .collect();
        SharePair { server, peer }
    }
}

/// Convenience wrapper: `SecretSplitter::new(F)?.split(data, rng)` on raw values.
pub fn split<R: RngCore + CryptoRng>(data: &[i64], field_modulus: i64, rng: &mut R) -> Result<SharePair> {
    let splitter = SecretSplitter::new(field_modulus)?;
    Ok(splitter.split(&UserVector::new(data, field_modulus), rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_user_vector_reduces_into_field() {
        let data = UserVector::new(&[3, -2, 100, -50], 97);
        assert_eq!(data.values(), &[3, -2, 3, 47]);
    }

    #[test]
    fn test_split_with_known_mask() {
        let splitter = SecretSplitter::new(97).unwrap();
        let data = UserVector::new(&[3, -2, 1, 0], 97);
        let shares = splitter.split_with(&data, &[10, 48, -48, 0]).unwrap();

        assert_eq!(shares.server_share(), &[10, 48, -48, 0]);
        assert_eq!(shares.peer_share(), &[-7, 47, 49 - 97, 0]);
        assert_eq!(shares.reconstruct(97).unwrap(), vec![3, -2, 1, 0]);

        assert!(matches!(
            splitter.split_with(&data, &[1, 2]),
            Err(P4PError::InvalidDimension { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_rejects_bad_modulus() {
        assert!(matches!(SecretSplitter::new(1), Err(P4PError::Configuration(_))));
    }

    proptest! {
        #[test]
        fn prop_shares_reconstruct_data(
            data in prop::collection::vec(any::<i64>(), 1..32),
            seed in any::<u64>(),
            f_idx in 0usize..4,
        ) {
            let moduli = [2i64, 97, 1_000_003, 4_611_686_018_427_387_847];
            let f = moduli[f_idx];
            let mut rng = ChaCha20Rng::seed_from_u64(seed);

            let shares = split(&data, f, &mut rng).unwrap();
            let expected: Vec<i64> = data.iter().map(|&x| centered_mod(x as i128, f)).collect();
            prop_assert_eq!(shares.reconstruct(f).unwrap(), expected);
            for (&u, &v) in shares.server_share().iter().zip(shares.peer_share()) {
                prop_assert!(u >= -(f / 2) && u <= (f + 1) / 2 - 1);
                prop_assert!(v >= -(f / 2) && v <= (f + 1) / 2 - 1);
            }
        }
    }
}
