//! Proof that one committed value is the square of another.
//!
//! Given `A = g^a h^{r_a}` and `B = g^{a^2} h^{r_b}`, write
//! `t = r_b - a * r_a mod q` so that `B = A^a h^t`. The prover shows
//! knowledge of `(a, r_a, t)` satisfying both relations with the same `a`.

use merlin::Transcript;
use rand::{CryptoRng, RngCore};

use crate::group::{GroupElement, GroupParameters, Scalar};
use crate::transcript::TranscriptProtocol;

const SQUARE_LABEL: &[u8] = b"p4p-square-commitment";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SquareProof {
    base: GroupElement,
    square: GroupElement,
    t1: GroupElement,
    t2: GroupElement,
    z1: Scalar,
    z2: Scalar,
    z3: Scalar,
}

impl SquareProof {
    /// Commits to `value` and `value^2` and proves the relation.
    ///
    /// # Arguments
    /// * `group` - Group the commitments live in
    /// * `value` - The base value `a`, reduced mod `q`
    /// * `base_randomness` - Randomness `r_a` of the base commitment
    /// * `rng` - Source of the square randomness and the nonces
    ///
    /// # Returns
    /// * `(Self, Scalar)` - The proof and the square randomness `r_b`
    pub fn prove<R: RngCore + CryptoRng>(
        group: &GroupParameters,
        value: &Scalar,
        base_randomness: &Scalar,
        rng: &mut R,
    ) -> (Self, Scalar) {
        let square_randomness = group.random_scalar(rng);
        let base = group.exp_gh(value, base_randomness);
        let square = group.exp_gh(&group.scalar_mul(value, value), &square_randomness);
        let t = group.scalar_sub(&square_randomness, &group.scalar_mul(value, base_randomness));

        let w1 = group.random_scalar(rng);
        let w2 = group.random_scalar(rng);
        let w3 = group.random_scalar(rng);
        let t1 = group.exp_gh(&w1, &w2);
        let t2 = group.mul(&group.pow(&base, &w1), &group.pow(group.h(), &w3));

        let e = challenge(group, &base, &square, &t1, &t2);
        let z1 = group.scalar_add(&w1, &group.scalar_mul(&e, value));
        let z2 = group.scalar_add(&w2, &group.scalar_mul(&e, base_randomness));
        let z3 = group.scalar_add(&w3, &group.scalar_mul(&e, &t));

        let proof = Self {
            base,
            square,
            t1,
            t2,
            z1,
            z2,
            z3,
        };
        (proof, square_randomness)
    }

    /// Commitment to the base value.
    pub fn base(&self) -> &GroupElement {
        &self.base
    }

    /// Commitment to the squared value.
    pub fn square(&self) -> &GroupElement {
        &self.square
    }

    pub fn verify(&self, group: &GroupParameters) -> bool {
        let elements = [&self.base, &self.square, &self.t1, &self.t2];
        if !elements.iter().all(|x| group.is_element(x)) {
            return false;
        }
        if [&self.z1, &self.z2, &self.z3].iter().any(|z| *z >= group.q()) {
            return false;
        }

        let e = challenge(group, &self.base, &self.square, &self.t1, &self.t2);

        let lhs = group.exp_gh(&self.z1, &self.z2);
        let rhs = group.mul(&self.t1, &group.pow(&self.base, &e));
        if lhs != rhs {
            return false;
        }

        let lhs = group.mul(&group.pow(&self.base, &self.z1), &group.pow(group.h(), &self.z3));
        let rhs = group.mul(&self.t2, &group.pow(&self.square, &e));
        lhs == rhs
    }

    #[cfg(test)]
    pub(crate) fn square_mut(&mut self) -> &mut GroupElement {
        &mut self.square
    }
}

fn challenge(
    group: &GroupParameters,
    base: &GroupElement,
    square: &GroupElement,
    t1: &GroupElement,
    t2: &GroupElement,
) -> Scalar {
    let mut transcript = Transcript::new(SQUARE_LABEL);
    transcript.append_group(group);
    transcript.append_biguint(b"base", base);
    transcript.append_biguint(b"square", square);
    transcript.append_biguint(b"t1", t1);
    transcript.append_biguint(b"t2", t2);
    transcript.challenge_scalar(b"challenge", group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::PedersenCommitment;
    use crate::tests::test_group;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_square_proof_roundtrip() {
        let group = test_group();
        let cm = PedersenCommitment::new(group);
        let mut rng = ChaCha20Rng::seed_from_u64(41);

        for value in [0i128, 7, -12, 48] {
            let a = group.scalar_from_i128(value);
            let ra = group.random_scalar(&mut rng);
            let (proof, rb) = SquareProof::prove(group, &a, &ra, &mut rng);

            assert!(proof.verify(group));
            assert_eq!(proof.base(), &cm.commit(&a, &ra));
            assert_eq!(proof.square(), &cm.commit_i128(value * value, &rb));
        }
    }

    #[test]
    fn test_square_proof_detects_wrong_square() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let a = group.scalar_from_i128(5);
        let ra = group.random_scalar(&mut rng);
        let (mut proof, rb) = SquareProof::prove(group, &a, &ra, &mut rng);

        *proof.square_mut() = group.exp_gh(&group.scalar_from_i128(26), &rb);
        assert!(!proof.verify(group));
    }
}
