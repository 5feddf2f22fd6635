//! Pedersen commitments `Commit(x, r) = g^x h^r mod p`.
//!
//! The scheme is additively homomorphic:
//! `Commit(a, r1) * Commit(b, r2) == Commit(a + b, r1 + r2)`, which is what
//! lets the server combine the checksum commitments of both shares and the
//! modular corrector without ever seeing the openings.

use rand::{CryptoRng, RngCore};

use crate::group::{GroupElement, GroupParameters, Scalar};

/// A commitment together with the randomness that opens it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub commitment: GroupElement,
    pub randomness: Scalar,
}

#[derive(Clone, Copy, Debug)]
pub struct PedersenCommitment<'a> {
    group: &'a GroupParameters,
}

impl<'a> PedersenCommitment<'a> {
    pub fn new(group: &'a GroupParameters) -> Self {
        Self { group }
    }

    pub fn group(&self) -> &'a GroupParameters {
        self.group
    }

    pub fn commit(&self, value: &Scalar, randomness: &Scalar) -> GroupElement {
        self.group.exp_gh(value, randomness)
    }

    /// Commits to a signed integer, reduced mod `q`.
    pub fn commit_i128(&self, value: i128, randomness: &Scalar) -> GroupElement {
        self.commit(&self.group.scalar_from_i128(value), randomness)
    }

    /// Commits with fresh randomness drawn from `[1, q - 1]`.
    pub fn commit_random<R: RngCore + CryptoRng>(&self, value: &Scalar, rng: &mut R) -> Opening {
        let randomness = self.group.random_scalar(rng);
        Opening {
            commitment: self.commit(value, &randomness),
            randomness,
        }
    }

    pub fn verify(&self, commitment: &GroupElement, value: &Scalar, randomness: &Scalar) -> bool {
        &self.commit(value, randomness) == commitment
    }

    /// Product of commitments, i.e. a commitment to the sum of the values.
    pub fn combine<'b, I>(&self, commitments: I) -> GroupElement
    where
        I: IntoIterator<Item = &'b GroupElement>,
    {
        commitments
            .into_iter()
            .fold(GroupElement::from(1u32), |acc, c| self.group.mul(&acc, c))
    }

    /// `c^k`, a commitment to `k` times the value.
    pub fn scale(&self, commitment: &GroupElement, k: &Scalar) -> GroupElement {
        self.group.pow(commitment, k)
    }
}
