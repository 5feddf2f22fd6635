//! Set-membership proofs for Pedersen commitments.
//!
//! A [`MembershipProof`] shows that `C = g^x h^r` opens to one of a short
//! public list of values `{v_0, ..., v_{n-1}}` without revealing which. It is
//! the Cramer-Damgard-Schoenmakers OR composition of Schnorr proofs of
//! knowledge of `log_h(C * g^{-v_i})`, made non-interactive with a merlin
//! transcript. The branch challenges must sum to the transcript challenge, so
//! at most one branch can be answered without simulation.

use merlin::Transcript;
use rand::{CryptoRng, RngCore};

use crate::error::{P4PError, Result};
use crate::group::{GroupElement, GroupParameters, Scalar};
use crate::transcript::TranscriptProtocol;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipProof {
    commitment: GroupElement,
    announcements: Vec<GroupElement>,
    challenges: Vec<Scalar>,
    responses: Vec<Scalar>,
}

impl MembershipProof {
    /// Commits to `set[index]` under `randomness` and proves membership.
    ///
    /// # Arguments
    /// * `group` - Group the commitment lives in
    /// * `label` - Domain separator for the Fiat-Shamir transcript
    /// * `set` - Public candidate values, as exponents
    /// * `index` - Position of the committed value in `set`
    /// * `randomness` - Commitment randomness `r`
    /// * `rng` - Source of the simulation and nonce randomness
    ///
    /// # Returns
    /// * `Result<Self>` - The proof, which carries its commitment
    pub fn prove<R: RngCore + CryptoRng>(
        group: &GroupParameters,
        label: &'static [u8],
        set: &[Scalar],
        index: usize,
        randomness: &Scalar,
        rng: &mut R,
    ) -> Result<Self> {
        if index >= set.len() {
            return Err(P4PError::InvalidArgument(format!(
                "Membership index {} out of range for a set of {} values",
                index,
                set.len()
            )));
        }

        let commitment = group.exp_gh(&set[index], randomness);
        let offsets = offset_commitments(group, &commitment, set);

        let mut announcements = Vec::with_capacity(set.len());
        let mut challenges = Vec::with_capacity(set.len());
        let mut responses = Vec::with_capacity(set.len());
        let nonce = group.random_scalar(rng);

        for (i, offset) in offsets.iter().enumerate() {
            if i == index {
                announcements.push(group.pow(group.h(), &nonce));
                challenges.push(Scalar::default());
                responses.push(Scalar::default());
            } else {
                // Simulated branch: a_i = h^{z_i} * D_i^{-e_i}
                let e = group.random_scalar(rng);
                let z = group.random_scalar(rng);
                let a = group.mul(
                    &group.pow(group.h(), &z),
                    &group.pow(&group.inv(offset), &e),
                );
                announcements.push(a);
                challenges.push(e);
                responses.push(z);
            }
        }

        let total = fiat_shamir(group, label, set, &commitment, &announcements);
        let simulated = challenges
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .fold(Scalar::default(), |acc, (_, e)| group.scalar_add(&acc, e));
        let real_challenge = group.scalar_sub(&total, &simulated);
        responses[index] = group.scalar_add(&nonce, &group.scalar_mul(&real_challenge, randomness));
        challenges[index] = real_challenge;

        Ok(Self {
            commitment,
            announcements,
            challenges,
            responses,
        })
    }

    pub fn commitment(&self) -> &GroupElement {
        &self.commitment
    }

    /// Checks the proof against the same `label` and `set` it was built for.
    pub fn verify(&self, group: &GroupParameters, label: &'static [u8], set: &[Scalar]) -> bool {
        let n = set.len();
        if n == 0
            || self.announcements.len() != n
            || self.challenges.len() != n
            || self.responses.len() != n
        {
            return false;
        }
        if !group.is_element(&self.commitment)
            || !self.announcements.iter().all(|a| group.is_element(a))
            || self.challenges.iter().chain(&self.responses).any(|s| s >= group.q())
        {
            return false;
        }

        let total = fiat_shamir(group, label, set, &self.commitment, &self.announcements);
        let sum = self
            .challenges
            .iter()
            .fold(Scalar::default(), |acc, e| group.scalar_add(&acc, e));
        if sum != total {
            return false;
        }

        let offsets = offset_commitments(group, &self.commitment, set);
        offsets
            .iter()
            .zip(&self.announcements)
            .zip(self.challenges.iter().zip(&self.responses))
            .all(|((offset, a), (e, z))| {
                group.pow(group.h(), z) == group.mul(a, &group.pow(offset, e))
            })
    }

    #[cfg(test)]
    pub(crate) fn commitment_mut(&mut self) -> &mut GroupElement {
        &mut self.commitment
    }
}

/// `D_i = C * g^{-v_i}` for every candidate value.
fn offset_commitments(group: &GroupParameters, commitment: &GroupElement, set: &[Scalar]) -> Vec<GroupElement> {
    set.iter()
        .map(|v| group.mul(commitment, &group.inv(&group.pow(group.g(), v))))
        .collect()
}

fn fiat_shamir(
    group: &GroupParameters,
    label: &'static [u8],
    set: &[Scalar],
    commitment: &GroupElement,
    announcements: &[GroupElement],
) -> Scalar {
    let mut transcript = Transcript::new(label);
    transcript.append_group(group);
    for v in set {
        transcript.append_biguint(b"value", v);
    }
    transcript.append_biguint(b"commitment", commitment);
    for a in announcements {
        transcript.append_biguint(b"announcement", a);
    }
    transcript.challenge_scalar(b"challenge", group)
}

const BIT_LABEL: &[u8] = b"p4p-bit-commitment";
const THREE_WAY_LABEL: &[u8] = b"p4p-three-way-commitment";

/// Commitment to a value in `{0, 1}` with a proof of that fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitCommitment {
    proof: MembershipProof,
}

impl BitCommitment {
    pub fn commit<R: RngCore + CryptoRng>(
        group: &GroupParameters,
        bit: bool,
        randomness: &Scalar,
        rng: &mut R,
    ) -> Result<Self> {
        let proof = MembershipProof::prove(
            group,
            BIT_LABEL,
            &bit_set(),
            usize::from(bit),
            randomness,
            rng,
        )?;
        Ok(Self { proof })
    }

    pub fn commitment(&self) -> &GroupElement {
        self.proof.commitment()
    }

    pub fn verify(&self, group: &GroupParameters) -> bool {
        self.proof.verify(group, BIT_LABEL, &bit_set())
    }
}

fn bit_set() -> [Scalar; 2] {
    [Scalar::from(0u32), Scalar::from(1u32)]
}

/// Commitment to a modular corrector in `{0, F, -F}` with a proof of that
/// fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreeWayCommitment {
    proof: MembershipProof,
}

impl ThreeWayCommitment {
    /// # Errors
    /// * `ArithmeticDefect` if `value` is not one of `0`, `F`, `-F`
    pub fn commit<R: RngCore + CryptoRng>(
        group: &GroupParameters,
        field_modulus: i64,
        value: i64,
        randomness: &Scalar,
        rng: &mut R,
    ) -> Result<Self> {
        let index = match value {
            0 => 0,
            v if v == field_modulus => 1,
            v if v == -field_modulus => 2,
            v => {
                return Err(P4PError::ArithmeticDefect(format!(
                    "Modular corrector {} is not in {{0, {}, -{}}}",
                    v, field_modulus, field_modulus
                )))
            }
        };

        let set = three_way_set(group, field_modulus);
        let proof = MembershipProof::prove(group, THREE_WAY_LABEL, &set, index, randomness, rng)?;
        Ok(Self { proof })
    }

    pub fn commitment(&self) -> &GroupElement {
        self.proof.commitment()
    }

    pub fn verify(&self, group: &GroupParameters, field_modulus: i64) -> bool {
        self.proof
            .verify(group, THREE_WAY_LABEL, &three_way_set(group, field_modulus))
    }

    #[cfg(test)]
    pub(crate) fn proof_mut(&mut self) -> &mut MembershipProof {
        &mut self.proof
    }
}

fn three_way_set(group: &GroupParameters, field_modulus: i64) -> [Scalar; 3] {
    let f = field_modulus as i128;
    [
        group.scalar_from_i128(0),
        group.scalar_from_i128(f),
        group.scalar_from_i128(-f),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::PedersenCommitment;
    use crate::tests::test_group;
    use num_bigint::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_bit_commitment() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(31);

        for bit in [false, true] {
            let r = group.random_scalar(&mut rng);
            let proof = BitCommitment::commit(group, bit, &r, &mut rng).unwrap();
            assert!(proof.verify(group));

            let expected = PedersenCommitment::new(group).commit_i128(i128::from(bit), &r);
            assert_eq!(proof.commitment(), &expected);
        }
    }

    #[test]
    fn test_non_member_cannot_be_proven_by_swapping_commitment() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(32);
        let r = group.random_scalar(&mut rng);

        let mut proof = MembershipProof::prove(group, BIT_LABEL, &bit_set(), 1, &r, &mut rng).unwrap();
        assert!(proof.verify(group, BIT_LABEL, &bit_set()));

        // Substitute a commitment to 2 under the same randomness.
        *proof.commitment_mut() = group.exp_gh(&BigUint::from(2u32), &r);
        assert!(!proof.verify(group, BIT_LABEL, &bit_set()));
    }

    #[test]
    fn test_three_way_commitment() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(33);
        let f = 97;

        for value in [0, f, -f] {
            let r = group.random_scalar(&mut rng);
            let proof = ThreeWayCommitment::commit(group, f, value, &r, &mut rng).unwrap();
            assert!(proof.verify(group, f));
            assert!(!proof.verify(group, 101));

            let expected = PedersenCommitment::new(group).commit_i128(value as i128, &r);
            assert_eq!(proof.commitment(), &expected);
        }
    }

    #[test]
    fn test_three_way_rejects_out_of_set_value() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(34);
        let r = group.random_scalar(&mut rng);
        assert!(matches!(
            ThreeWayCommitment::commit(group, 97, 1, &r, &mut rng),
            Err(P4PError::ArithmeticDefect(_))
        ));
    }

    #[test]
    fn test_labels_separate_domains() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(35);
        let r = group.random_scalar(&mut rng);
        let proof = MembershipProof::prove(group, BIT_LABEL, &bit_set(), 0, &r, &mut rng).unwrap();
        assert!(!proof.verify(group, THREE_WAY_LABEL, &bit_set()));
    }

    #[test]
    fn test_rejects_truncated_proof() {
        let group = test_group();
        let mut rng = ChaCha20Rng::seed_from_u64(36);
        let r = group.random_scalar(&mut rng);
        let mut proof = MembershipProof::prove(group, BIT_LABEL, &bit_set(), 0, &r, &mut rng).unwrap();
        proof.responses.pop();
        assert!(!proof.verify(group, BIT_LABEL, &bit_set()));
    }
}
