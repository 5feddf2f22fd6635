//! Prime-order subgroup of `Z_p^*` for a safe prime `p = 2q + 1`.
//!
//! Commitments live in the subgroup of quadratic residues, which has prime
//! order `q`. The two generators `g` and `h` are derived by hashing a public
//! seed under different labels, so no party knows `log_g h`.

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use sha3::{Digest, Sha3_512};
use tracing::debug;

use crate::error::{P4PError, Result};

/// An element of the order-`q` subgroup, reduced mod `p`.
pub type GroupElement = BigUint;

/// An exponent, reduced mod `q`.
pub type Scalar = BigUint;

/// Default public seed for generator derivation.
pub const DEFAULT_GENERATOR_SEED: &[u8] = b"p4p-aggregation/v1";

/// The 2048-bit MODP safe prime from RFC 3526, section 3.
const RFC3526_2048_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
    "DE2BCBF6955817183995497CEA956AE515D2261898FA0510",
    "15728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// Bases for the Miller-Rabin test. Fixed bases are adequate here: the
/// inputs are either public constants or randomly drawn candidates.
const MILLER_RABIN_BASES: [u32; 16] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

/// Sieve limit used to discard candidates before Miller-Rabin.
const SIEVE_LIMIT: u32 = 2000;

const MIN_GROUP_BITS: u64 = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupParameters {
    p: BigUint,
    q: BigUint,
    g: GroupElement,
    h: GroupElement,
}

impl GroupParameters {
    /// Generates a fresh safe-prime group with a `bits`-bit modulus.
    ///
    /// # Arguments
    /// * `bits` - Bit length of `p` (at least 16)
    /// * `seed` - Public seed for the generator derivation
    /// * `rng` - Randomness for the prime search
    pub fn generate<R: RngCore + CryptoRng>(bits: u64, seed: &[u8], rng: &mut R) -> Result<Self> {
        if bits < MIN_GROUP_BITS {
            return Err(P4PError::Configuration(format!(
                "Group modulus must have at least {} bits, got {}",
                MIN_GROUP_BITS, bits
            )));
        }

        let (p, q) = random_safe_prime(bits, rng);
        debug!(bits, "generated safe prime group");
        Self::with_generators(p, q, seed)
    }

    /// Builds a group from a known safe prime, checking that both `p` and
    /// `(p - 1) / 2` are prime.
    pub fn from_safe_prime(p: BigUint, seed: &[u8]) -> Result<Self> {
        if p.bits() < MIN_GROUP_BITS {
            return Err(P4PError::Configuration(format!(
                "Group modulus must have at least {} bits",
                MIN_GROUP_BITS
            )));
        }
        let q: BigUint = (&p - BigUint::one()) >> 1usize;
        if !is_probable_prime(&p) || !is_probable_prime(&q) {
            return Err(P4PError::Configuration(
                "Group modulus is not a safe prime".to_string(),
            ));
        }
        Self::with_generators(p, q, seed)
    }

    /// The RFC 3526 2048-bit MODP group with derived generators.
    pub fn rfc3526_2048(seed: &[u8]) -> Result<Self> {
        let p = BigUint::parse_bytes(RFC3526_2048_HEX.as_bytes(), 16).ok_or_else(|| {
            P4PError::Configuration("Malformed RFC 3526 modulus".to_string())
        })?;
        Self::from_safe_prime(p, seed)
    }

    fn with_generators(p: BigUint, q: BigUint, seed: &[u8]) -> Result<Self> {
        let g = hash_to_subgroup(&p, seed, b"generator-g")?;
        let h = hash_to_subgroup(&p, seed, b"generator-h")?;
        if g == h {
            return Err(P4PError::Configuration(
                "Derived generators coincide".to_string(),
            ));
        }
        Ok(Self { p, q, g, h })
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub fn g(&self) -> &GroupElement {
        &self.g
    }

    pub fn h(&self) -> &GroupElement {
        &self.h
    }

    #[inline]
    pub fn mul(&self, a: &GroupElement, b: &GroupElement) -> GroupElement {
        (a * b) % &self.p
    }

    #[inline]
    pub fn pow(&self, base: &GroupElement, exponent: &Scalar) -> GroupElement {
        base.modpow(exponent, &self.p)
    }

    /// Inverse in `Z_p^*` via Fermat.
    pub fn inv(&self, a: &GroupElement) -> GroupElement {
        let exponent = &self.p - BigUint::from(2u32);
        a.modpow(&exponent, &self.p)
    }

    /// `g^x * h^r mod p`.
    pub fn exp_gh(&self, x: &Scalar, r: &Scalar) -> GroupElement {
        self.mul(&self.pow(&self.g, x), &self.pow(&self.h, r))
    }

    /// True if `x` lies in the order-`q` subgroup.
    pub fn is_element(&self, x: &GroupElement) -> bool {
        !x.is_zero() && x < &self.p && x.modpow(&self.q, &self.p).is_one()
    }

    /// Uniform scalar in `[1, q - 1]`.
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Scalar {
        rng.gen_biguint_range(&BigUint::one(), &self.q)
    }

    /// Reduces a signed integer into `[0, q)`.
    pub fn scalar_from_i128(&self, v: i128) -> Scalar {
        let magnitude = BigUint::from(v.unsigned_abs()) % &self.q;
        if v < 0 && !magnitude.is_zero() {
            &self.q - magnitude
        } else {
            magnitude
        }
    }

    pub fn scalar_from_bigint(&self, v: &BigInt) -> Scalar {
        let magnitude = v.magnitude() % &self.q;
        if v.sign() == Sign::Minus && !magnitude.is_zero() {
            &self.q - magnitude
        } else {
            magnitude
        }
    }

    pub fn scalar_add(&self, a: &Scalar, b: &Scalar) -> Scalar {
        (a + b) % &self.q
    }

    pub fn scalar_sub(&self, a: &Scalar, b: &Scalar) -> Scalar {
        let b = b % &self.q;
        ((a % &self.q) + &self.q - b) % &self.q
    }

    pub fn scalar_mul(&self, a: &Scalar, b: &Scalar) -> Scalar {
        (a * b) % &self.q
    }

    /// Inverse mod the prime `q`.
    pub fn scalar_inv(&self, a: &Scalar) -> Scalar {
        let exponent = &self.q - BigUint::from(2u32);
        a.modpow(&exponent, &self.q)
    }
}

/// Hashes `seed || label` into `Z_p^*` and squares the result into the
/// quadratic-residue subgroup.
fn hash_to_subgroup(p: &BigUint, seed: &[u8], label: &[u8]) -> Result<GroupElement> {
    // 128 extra bits keep the reduction mod p statistically close to uniform.
    let wanted = (p.bits() as usize + 7) / 8 + 16;

    for counter in 0u32..256 {
        let mut bytes = Vec::with_capacity(wanted + 64);
        let mut block = 0u32;
        while bytes.len() < wanted {
            let mut hasher = Sha3_512::new();
            hasher.update(b"p4p-aggregation/hash-to-group");
            hasher.update((label.len() as u64).to_le_bytes());
            hasher.update(label);
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            hasher.update(block.to_le_bytes());
            bytes.extend_from_slice(&hasher.finalize());
            block += 1;
        }

        let x = BigUint::from_bytes_be(&bytes) % p;
        let y = (&x * &x) % p;
        if y > BigUint::one() {
            return Ok(y);
        }
    }

    Err(P4PError::Configuration(
        "Could not derive a subgroup generator".to_string(),
    ))
}

fn small_primes(limit: u32) -> Vec<u32> {
    let limit = limit as usize;
    let mut composite = vec![false; limit + 1];
    let mut primes = Vec::new();
    for i in 2..=limit {
        if !composite[i] {
            primes.push(i as u32);
            let mut j = i * i;
            while j <= limit {
                composite[j] = true;
                j += i;
            }
        }
    }
    primes
}

fn rem_small(n: &BigUint, m: u32) -> u32 {
    let m = m as u64;
    n.to_u32_digits()
        .iter()
        .rev()
        .fold(0u64, |acc, &digit| ((acc << 32) | digit as u64) % m) as u32
}

/// Miller-Rabin with fixed bases.
pub fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::one();
    if n <= &one {
        return false;
    }
    for &base in &MILLER_RABIN_BASES {
        if n == &BigUint::from(base) {
            return true;
        }
        if rem_small(n, base) == 0 {
            return false;
        }
    }

    let n_minus_one = n - &one;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d: BigUint = &n_minus_one >> (s as usize);

    'witness: for &base in &MILLER_RABIN_BASES {
        let mut x = BigUint::from(base).modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

/// Searches for `p = 2q + 1` with both `p` and `q` prime and `p` of exactly
/// `bits` bits.
fn random_safe_prime<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> (BigUint, BigUint) {
    let sieve = small_primes(SIEVE_LIMIT);
    let top = BigUint::one() << ((bits - 2) as usize);

    loop {
        let candidate = rng.gen_biguint(bits - 1) | &top | BigUint::one();
        let p: BigUint = (&candidate << 1usize) + BigUint::one();

        let survives = sieve.iter().all(|&sp| {
            let small = BigUint::from(sp);
            (candidate == small || rem_small(&candidate, sp) != 0)
                && (p == small || rem_small(&p, sp) != 0)
        });
        if !survives {
            continue;
        }

        // Cheap Fermat filter on p before the full tests.
        if !BigUint::from(2u32).modpow(&(&p - BigUint::one()), &p).is_one() {
            continue;
        }
        if is_probable_prime(&candidate) && is_probable_prime(&p) {
            return (p, candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_probable_prime() {
        assert!(is_probable_prime(&BigUint::from(2u32)));
        assert!(is_probable_prime(&BigUint::from(1_000_003u32)));
        assert!(!is_probable_prime(&BigUint::from(1_000_001u32)));
        assert!(!is_probable_prime(&BigUint::from(3_215_031_751u64)));
        // 2^127 - 1 is a Mersenne prime.
        let m127 = (BigUint::one() << 127usize) - BigUint::one();
        assert!(is_probable_prime(&m127));
        assert!(!is_probable_prime(&(&m127 + BigUint::from(2u32))));
    }

    #[test]
    fn test_generate_small_group() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let group = GroupParameters::generate(64, DEFAULT_GENERATOR_SEED, &mut rng).unwrap();

        assert_eq!(group.p().bits(), 64);
        assert_eq!(group.p(), &((group.q() << 1usize) + BigUint::one()));
        assert!(is_probable_prime(group.p()));
        assert!(is_probable_prime(group.q()));
        assert!(group.is_element(group.g()));
        assert!(group.is_element(group.h()));
        assert_ne!(group.g(), group.h());
    }

    #[test]
    fn test_from_safe_prime_rejects_non_safe_prime() {
        // 1000003 is prime but (1000003 - 1) / 2 = 500001 = 3 * 166667.
        let err = GroupParameters::from_safe_prime(BigUint::from(1_000_003u32), DEFAULT_GENERATOR_SEED);
        assert!(matches!(err, Err(P4PError::Configuration(_))));
    }

    #[test]
    fn test_from_safe_prime_accepts_known_safe_prime() {
        // 2 * 32771 + 1 = 65543, both prime.
        let group =
            GroupParameters::from_safe_prime(BigUint::from(65_543u32), DEFAULT_GENERATOR_SEED).unwrap();
        assert_eq!(group.q(), &BigUint::from(32_771u32));
        assert!(group.is_element(group.g()));
    }

    #[test]
    fn test_scalar_reduction() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let group = GroupParameters::generate(32, DEFAULT_GENERATOR_SEED, &mut rng).unwrap();
        let q = group.q().clone();

        assert_eq!(group.scalar_from_i128(-1), &q - BigUint::one());
        assert_eq!(group.scalar_from_i128(5), BigUint::from(5u32));
        assert!(group.scalar_from_i128(0).is_zero());
        assert_eq!(
            group.scalar_from_bigint(&BigInt::from(-7)),
            group.scalar_from_i128(-7)
        );

        let a = group.random_scalar(&mut rng);
        let inv = group.scalar_inv(&a);
        assert!(group.scalar_mul(&a, &inv).is_one());
        assert!(group.scalar_sub(&a, &a).is_zero());
    }

    #[test]
    fn test_generator_derivation_is_deterministic() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let group = GroupParameters::generate(48, b"seed-a", &mut rng).unwrap();
        let again = GroupParameters::from_safe_prime(group.p().clone(), b"seed-a").unwrap();
        let other = GroupParameters::from_safe_prime(group.p().clone(), b"seed-b").unwrap();
        assert_eq!(group, again);
        assert_ne!(group.g(), other.g());
    }

    #[test]
    #[ignore = "slow: full Miller-Rabin on a 2048-bit modulus"]
    fn test_rfc3526_group() {
        let group = GroupParameters::rfc3526_2048(DEFAULT_GENERATOR_SEED).unwrap();
        assert_eq!(group.p().bits(), 2048);
        assert!(group.is_element(group.h()));
    }
}
