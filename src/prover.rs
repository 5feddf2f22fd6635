//! Construction of the L2-norm-bound proof by the data owner.
//!
//! For every challenge row `c_k` the prover computes the checksums
//! `x_k = c_k . u` and `y_k = c_k . v`, the exact integer `s_k = x_k + y_k + b_k`
//! in centered form, and a square proof binding `Commit(s_k)` to
//! `Commit(s_k^2)`. The product of the square commitments, squared, commits to
//! `2 * sum(s_k^2)`, whose bit decomposition proves the bound.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::challenge::ChallengeMatrix;
use crate::config::ProtocolContext;
use crate::error::{P4PError, Result};
use crate::field::{centered_mod, inner_product};
use crate::group::{GroupElement, GroupParameters, Scalar};
use crate::membership::{BitCommitment, ThreeWayCommitment};
use crate::proof::{IterationProof, L2NormBoundProof, PeerProof, ServerProof};
use crate::sharing::SharePair;
use crate::square::SquareProof;

type Seed = [u8; 32];

/// Everything one iteration produces, including the prover-only witnesses.
struct IterationOutput {
    proof: IterationProof,
    peer_checksum: i64,
    peer_randomness: Scalar,
    sum: i64,
    square_randomness: Scalar,
}

/// Builds proofs for one user.
///
/// Both the shares and the round's challenge matrix must be supplied before
/// [`ProofBuilder::build`] is called.
#[derive(Clone, Debug)]
pub struct ProofBuilder<'a> {
    ctx: &'a ProtocolContext,
    shares: Option<&'a SharePair>,
    challenge: Option<&'a ChallengeMatrix>,
}

impl<'a> ProofBuilder<'a> {
    pub fn new(ctx: &'a ProtocolContext) -> Self {
        Self {
            ctx,
            shares: None,
            challenge: None,
        }
    }

    pub fn shares(mut self, shares: &'a SharePair) -> Self {
        self.shares = Some(shares);
        self
    }

    pub fn challenge(mut self, challenge: &'a ChallengeMatrix) -> Self {
        self.challenge = Some(challenge);
        self
    }

    /// Builds the linked server and peer halves of the proof.
    ///
    /// # Arguments
    /// * `rng` - Secure randomness; each iteration and each bit proof is
    ///   driven by its own `ChaCha20Rng` seeded from it
    ///
    /// # Errors
    /// * `ProtocolState` if shares or the challenge matrix are missing
    /// * `InvalidDimension` if the shares or the matrix do not fit the config
    /// * `ArithmeticDefect` if a modular corrector leaves `{0, F, -F}`
    #[instrument(skip_all, level = "debug")]
    pub fn build<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<L2NormBoundProof> {
        let shares = self.shares.ok_or_else(|| {
            P4PError::ProtocolState("Shares must be set before building a proof".to_string())
        })?;
        let challenge = self.challenge.ok_or_else(|| {
            P4PError::ProtocolState(
                "Challenge matrix must be set before building a proof".to_string(),
            )
        })?;

        let config = self.ctx.config();
        challenge.check_shape(config.iterations, config.dimension)?;
        if shares.dimension() != config.dimension {
            return Err(P4PError::InvalidDimension {
                expected: config.dimension,
                got: shares.dimension(),
            });
        }

        let seeds: Vec<Seed> = (0..challenge.iterations()).map(|_| fresh_seed(rng)).collect();
        let outputs = challenge
            .rows()
            .zip(seeds)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(row, seed)| {
                let mut local = ChaCha20Rng::from_seed(seed);
                self.build_iteration(row, shares, &mut local)
            })
            .collect::<Result<Vec<_>>>()?;

        let group = self.ctx.group();
        let mut sum_of_squares = BigUint::zero();
        let mut square_product = GroupElement::one();
        let mut sum_randomness = Scalar::zero();
        for output in &outputs {
            let magnitude = BigUint::from(output.sum.unsigned_abs());
            sum_of_squares += &magnitude * &magnitude;
            square_product = group.mul(&square_product, output.square_proof().square());
            sum_randomness = group.scalar_add(&sum_randomness, &output.square_randomness);
        }

        // Squaring the commitment doubles the committed value.
        let doubled: BigUint = sum_of_squares << 1usize;
        let sum_commitment = group.mul(&square_product, &square_product);
        let sum_randomness = group.scalar_add(&sum_randomness, &sum_randomness);

        let bit_count = (doubled.bits() as usize).max(config.max_bit_count());
        debug!(
            bits = doubled.bits(),
            bit_count,
            max_bit_count = config.max_bit_count(),
            "decomposing sum of squares"
        );
        let bit_proofs = prove_bits(group, &doubled, bit_count, sum_randomness, rng)?;

        let mut iterations = Vec::with_capacity(outputs.len());
        let mut checksums = Vec::with_capacity(outputs.len());
        let mut randomness = Vec::with_capacity(outputs.len());
        for output in outputs {
            iterations.push(output.proof);
            checksums.push(output.peer_checksum);
            randomness.push(output.peer_randomness);
        }

        let server = ServerProof {
            challenge_digest: challenge.digest(),
            iterations,
            bit_proofs,
            sum_commitment,
        };
        let peer = PeerProof {
            checksums,
            randomness,
        };
        Ok(L2NormBoundProof::new(server, peer))
    }

    fn build_iteration(
        &self,
        row: &[i8],
        shares: &SharePair,
        rng: &mut ChaCha20Rng,
    ) -> Result<IterationOutput> {
        let group = self.ctx.group();
        let f = self.ctx.field_modulus();

        let x = centered_mod(inner_product(row, shares.server_share())?, f);
        let y = centered_mod(inner_product(row, shares.peer_share())?, f);
        let r_x = group.random_scalar(rng);
        let r_y = group.random_scalar(rng);

        let exact = x as i128 + y as i128;
        let s = centered_mod(exact, f);
        let corrector = i64::try_from(s as i128 - exact).map_err(|_| {
            P4PError::ArithmeticDefect(format!(
                "Modular corrector for x = {}, y = {} overflows",
                x, y
            ))
        })?;

        let r_b = group.random_scalar(rng);
        let corrector_proof = ThreeWayCommitment::commit(group, f, corrector, &r_b, rng)?;
        let corrector_commitment = corrector_proof.commitment().clone();

        // S_k = X_k * B_k * Y_k opens to s_k under r_x + r_y + r_b.
        let base_randomness = group.scalar_add(&group.scalar_add(&r_x, &r_y), &r_b);
        let (square_proof, square_randomness) =
            SquareProof::prove(group, &group.scalar_from_i128(s as i128), &base_randomness, rng);

        Ok(IterationOutput {
            proof: IterationProof {
                checksum: x,
                checksum_randomness: r_x,
                corrector_commitment,
                corrector_proof,
                square_proof,
            },
            peer_checksum: y,
            peer_randomness: r_y,
            sum: s,
            square_randomness,
        })
    }
}

impl IterationOutput {
    fn square_proof(&self) -> &SquareProof {
        &self.proof.square_proof
    }
}

/// Commits to each bit of `value` so that `prod C_i^{2^i}` opens to `value`
/// under `randomness`.
///
/// The first `bit_count - 1` bit randomnesses are uniform; the last one is
/// solved for: `r_last = (randomness - sum r_i 2^i) / 2^{bit_count - 1} mod q`.
fn prove_bits<R: RngCore + CryptoRng>(
    group: &GroupParameters,
    value: &BigUint,
    bit_count: usize,
    randomness: Scalar,
    rng: &mut R,
) -> Result<Vec<BitCommitment>> {
    let mut remaining = randomness;
    let mut bit_randomness = Vec::with_capacity(bit_count);
    for i in 0..bit_count.saturating_sub(1) {
        let r = group.random_scalar(rng);
        let weighted = group.scalar_mul(&r, &(BigUint::one() << i));
        remaining = group.scalar_sub(&remaining, &weighted);
        bit_randomness.push(r);
    }
    if bit_count > 0 {
        let top = BigUint::one() << (bit_count - 1);
        let top_inv = group.scalar_inv(&(top % group.q()));
        bit_randomness.push(group.scalar_mul(&remaining, &top_inv));
    }

    let seeds: Vec<Seed> = (0..bit_count).map(|_| fresh_seed(rng)).collect();
    bit_randomness
        .into_par_iter()
        .zip(seeds)
        .enumerate()
        .map(|(i, (r, seed))| {
            let mut local = ChaCha20Rng::from_seed(seed);
            BitCommitment::commit(group, value.bit(i as u64), &r, &mut local)
        })
        .collect()
}

fn fresh_seed<R: RngCore + CryptoRng>(rng: &mut R) -> Seed {
    let mut seed = Seed::default();
    rng.fill_bytes(&mut seed);
    seed
}

/// Opening of the bit commitments' weighted product, for tests.
#[cfg(test)]
pub(crate) fn weighted_bit_product(group: &GroupParameters, bits: &[BitCommitment]) -> GroupElement {
    let cm = crate::commitment::PedersenCommitment::new(group);
    bits.iter().enumerate().fold(GroupElement::one(), |acc, (i, bit)| {
        group.mul(&acc, &cm.scale(bit.commitment(), &(BigUint::one() << i)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::PedersenCommitment;
    use crate::config::ProtocolConfig;
    use crate::sharing::split;
    use crate::tests::{small_context, test_group};
    use rand::SeedableRng;

    #[test]
    fn test_build_requires_shares_and_challenge() {
        let ctx = small_context();
        let mut rng = ChaCha20Rng::seed_from_u64(61);
        let shares = split(&[3, -2, 1, 0], 97, &mut rng).unwrap();
        let matrix = crate::challenge::ChallengeGenerator::from_config(ctx.config())
            .unwrap()
            .generate(&mut rng);

        let err = ProofBuilder::new(&ctx).challenge(&matrix).build(&mut rng);
        assert!(matches!(err, Err(P4PError::ProtocolState(_))));

        let err = ProofBuilder::new(&ctx).shares(&shares).build(&mut rng);
        assert!(matches!(err, Err(P4PError::ProtocolState(_))));

        assert!(ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&matrix)
            .build(&mut rng)
            .is_ok());
    }

    #[test]
    fn test_build_rejects_mismatched_dimensions() {
        let ctx = small_context();
        let mut rng = ChaCha20Rng::seed_from_u64(62);
        let shares = split(&[3, -2, 1], 97, &mut rng).unwrap();
        let matrix = crate::challenge::ChallengeGenerator::from_config(ctx.config())
            .unwrap()
            .generate(&mut rng);
        let err = ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&matrix)
            .build(&mut rng);
        assert_eq!(err, Err(P4PError::InvalidDimension { expected: 4, got: 3 }));

        let shares = split(&[3, -2, 1, 0], 97, &mut rng).unwrap();
        let wrong = crate::challenge::ChallengeGenerator::new(8, 5)
            .unwrap()
            .generate(&mut rng);
        let err = ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&wrong)
            .build(&mut rng);
        assert!(matches!(err, Err(P4PError::InvalidDimension { .. })));
    }

    #[test]
    fn test_proof_shape_and_openings() {
        let ctx = small_context();
        let group = ctx.group();
        let cm = PedersenCommitment::new(group);
        let mut rng = ChaCha20Rng::seed_from_u64(63);

        let shares = split(&[3, -2, 1, 0], 97, &mut rng).unwrap();
        let matrix = crate::challenge::ChallengeGenerator::from_config(ctx.config())
            .unwrap()
            .generate(&mut rng);
        let proof = ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&matrix)
            .build(&mut rng)
            .unwrap();

        let server = proof.server();
        let peer = proof.peer();
        assert_eq!(server.iterations().len(), 8);
        assert_eq!(peer.checksums().len(), 8);
        assert_eq!(server.bit_proofs().len(), ctx.config().max_bit_count());
        assert_eq!(server.challenge_digest(), &matrix.digest());

        for (k, row) in matrix.rows().enumerate() {
            let it = &server.iterations()[k];
            let x = centered_mod(inner_product(row, shares.server_share()).unwrap(), 97);
            let y = centered_mod(inner_product(row, shares.peer_share()).unwrap(), 97);
            assert_eq!(it.checksum(), x);
            assert_eq!(peer.checksums()[k], y);

            // The square proof's base is X_k * B_k * Y_k.
            let x_commit = cm.commit_i128(x as i128, it.checksum_randomness());
            let y_commit = cm.commit_i128(y as i128, &peer.randomness()[k]);
            let s = cm.combine([&x_commit, it.corrector_commitment(), &y_commit]);
            assert_eq!(it.square_proof().base(), &s);
        }

        assert_eq!(
            &weighted_bit_product(group, server.bit_proofs()),
            server.sum_commitment()
        );
    }

    #[test]
    fn test_prove_bits_homomorphism() {
        let group = test_group();
        let cm = PedersenCommitment::new(group);
        let mut rng = ChaCha20Rng::seed_from_u64(64);

        let value = BigUint::from(0b1011_0110u32);
        let r = group.random_scalar(&mut rng);
        let bits = prove_bits(group, &value, 10, r.clone(), &mut rng).unwrap();

        assert_eq!(bits.len(), 10);
        assert!(bits.iter().all(|b| b.verify(group)));
        assert_eq!(weighted_bit_product(group, &bits), cm.commit(&value, &r));
    }

    #[test]
    fn test_oversized_sum_produces_extra_bits() {
        let config = ProtocolConfig::new(4, 97, 2, 2).unwrap();
        let ctx = ProtocolContext::new(config, test_group().clone()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(65);

        let shares = split(&[40, -35, 30, 20], 97, &mut rng).unwrap();
        let matrix = ChallengeMatrix::from_rows(vec![vec![1, 1, 1, 1], vec![1, -1, 1, -1]]).unwrap();
        let proof = ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&matrix)
            .build(&mut rng)
            .unwrap();

        // s = (-42, -12): 2 * (1764 + 144) = 3816 needs 12 bits, bound is 5.
        assert_eq!(ctx.config().max_bit_count(), 5);
        assert_eq!(proof.server().bit_proofs().len(), 12);
    }
}
