//! Two-stage verification of the L2-norm-bound proof.
//!
//! The privacy peer recomputes its checksums `y_k` and commits to them with
//! the prover's randomness ([`peer_verify`]). The server combines those
//! commitments with its own checksums and the server half of the proof
//! ([`server_verify`]). Rejection is an ordinary outcome and is reported as
//! `Ok(false)`; errors are reserved for misuse by the caller.

use num_bigint::BigUint;
use num_traits::One;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::challenge::ChallengeMatrix;
use crate::commitment::PedersenCommitment;
use crate::config::ProtocolContext;
use crate::error::{P4PError, Result};
use crate::field::{centered_mod, inner_product};
use crate::group::GroupElement;
use crate::proof::{ForwardedCommitments, IterationProof, PeerProof, ServerProof};

/// Why a server verification rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
enum Rejection {
    #[error("proof was built against a different challenge matrix")]
    StaleChallenge,
    #[error("proof or forwarded commitments have the wrong number of iterations")]
    IterationCount,
    #[error("forwarded commitment is not a group element")]
    MalformedForward,
    #[error("checksum not computed correctly")]
    Checksum,
    #[error("corrector commitment does not match its proof")]
    CorrectorMismatch,
    #[error("corrector proof failed")]
    CorrectorProof,
    #[error("S computed incorrectly")]
    SumCommitment,
    #[error("square proof failed")]
    SquareProof,
    #[error("bit decomposition exceeds the bound")]
    OversizedDecomposition,
    #[error("sum-of-squares commitment does not match the square proofs")]
    SumOfSquares,
    #[error("bit proof failed")]
    BitProof,
    #[error("homomorphism does not hold")]
    Homomorphism,
}

/// Recomputes `y_k = c_k . v mod F` and returns `Y_k = Commit(y_k, r_y_k)`
/// for forwarding to the server.
///
/// The prover's stated `y_k` are not trusted. This step never rejects; the
/// bound is checked by the server.
///
/// # Errors
/// * `InvalidDimension` if the share, the matrix, or the proof's randomness
///   do not fit the configuration
#[instrument(skip_all, level = "debug")]
pub fn peer_verify(
    ctx: &ProtocolContext,
    proof: &PeerProof,
    peer_share: &[i64],
    challenge: &ChallengeMatrix,
) -> Result<ForwardedCommitments> {
    let config = ctx.config();
    challenge.check_shape(config.iterations, config.dimension)?;
    check_share(peer_share, config.dimension)?;
    if proof.randomness.len() != config.iterations {
        return Err(P4PError::InvalidDimension {
            expected: config.iterations,
            got: proof.randomness.len(),
        });
    }

    let checksums = checksums(challenge, peer_share, ctx.field_modulus())?;
    if checksums != proof.checksums {
        debug!("prover's stated peer checksums differ from the recomputed ones");
    }

    let cm = PedersenCommitment::new(ctx.group());
    let commitments = checksums
        .par_iter()
        .zip(proof.randomness.par_iter())
        .map(|(&y, r)| cm.commit_i128(y as i128, r))
        .collect();

    Ok(ForwardedCommitments {
        challenge_digest: challenge.digest(),
        commitments,
    })
}

/// Full verification at the server.
///
/// # Arguments
/// * `ctx` - Protocol parameters and group
/// * `proof` - Server half of the user's proof
/// * `forwarded` - The peer's `Y_k` for this user
/// * `server_share` - The server's share `u`
/// * `challenge` - The round's challenge matrix
///
/// # Returns
/// * `Ok(true)` if every check passes, `Ok(false)` on any failed check
///
/// # Errors
/// * `InvalidDimension` if the share or matrix do not fit the configuration
/// * `ProtocolState` if the forwarded commitments were computed against a
///   different matrix than `challenge`
#[instrument(skip_all, level = "debug")]
pub fn server_verify(
    ctx: &ProtocolContext,
    proof: &ServerProof,
    forwarded: &ForwardedCommitments,
    server_share: &[i64],
    challenge: &ChallengeMatrix,
) -> Result<bool> {
    let config = ctx.config();
    challenge.check_shape(config.iterations, config.dimension)?;
    check_share(server_share, config.dimension)?;

    let digest = challenge.digest();
    if forwarded.challenge_digest != digest {
        return Err(P4PError::ProtocolState(
            "Forwarded commitments were computed against a different challenge matrix".to_string(),
        ));
    }

    let expected = checksums(challenge, server_share, ctx.field_modulus())?;
    match check_proof(ctx, proof, forwarded, &expected, &digest) {
        Ok(()) => Ok(true),
        Err(reason) => {
            debug!(%reason, "server verification rejected");
            Ok(false)
        }
    }
}

fn check_proof(
    ctx: &ProtocolContext,
    proof: &ServerProof,
    forwarded: &ForwardedCommitments,
    expected: &[i64],
    digest: &[u8; 32],
) -> std::result::Result<(), Rejection> {
    let group = ctx.group();
    let n = ctx.config().iterations;

    if &proof.challenge_digest != digest {
        return Err(Rejection::StaleChallenge);
    }
    if proof.iterations.len() != n || forwarded.commitments.len() != n {
        return Err(Rejection::IterationCount);
    }
    if !forwarded.commitments.par_iter().all(|y| group.is_element(y)) {
        return Err(Rejection::MalformedForward);
    }

    // Steps 1-4, independently per iteration.
    proof
        .iterations
        .par_iter()
        .zip(forwarded.commitments.par_iter())
        .zip(expected.par_iter())
        .enumerate()
        .try_for_each(|(k, ((it, y), &x))| {
            check_iteration(ctx, it, y, x).map_err(|reason| {
                debug!(iteration = k, %reason, "iteration check failed");
                reason
            })
        })?;

    // Step 5
    let max_bits = ctx.config().max_bit_count();
    if proof.bit_proofs.len() > max_bits {
        debug!(bits = proof.bit_proofs.len(), max_bits, "oversized bit decomposition");
        return Err(Rejection::OversizedDecomposition);
    }

    // Step 6: (prod B_k)^2 commits to 2 * sum(s_k^2).
    let square_product = proof
        .iterations
        .iter()
        .fold(GroupElement::one(), |acc, it| group.mul(&acc, it.square_proof.square()));
    if group.mul(&square_product, &square_product) != proof.sum_commitment {
        return Err(Rejection::SumOfSquares);
    }

    // Step 7
    if !proof.bit_proofs.par_iter().all(|bit| bit.verify(group)) {
        return Err(Rejection::BitProof);
    }
    let cm = PedersenCommitment::new(group);
    let recombined = proof
        .bit_proofs
        .iter()
        .enumerate()
        .fold(GroupElement::one(), |acc, (i, bit)| {
            group.mul(&acc, &cm.scale(bit.commitment(), &(BigUint::one() << i)))
        });
    if recombined != proof.sum_commitment {
        return Err(Rejection::Homomorphism);
    }

    Ok(())
}

fn check_iteration(
    ctx: &ProtocolContext,
    it: &IterationProof,
    forwarded: &GroupElement,
    expected_checksum: i64,
) -> std::result::Result<(), Rejection> {
    let group = ctx.group();

    if it.checksum != expected_checksum {
        return Err(Rejection::Checksum);
    }

    if it.corrector_proof.commitment() != &it.corrector_commitment {
        return Err(Rejection::CorrectorMismatch);
    }
    if !it.corrector_proof.verify(group, ctx.field_modulus()) {
        return Err(Rejection::CorrectorProof);
    }

    let cm = PedersenCommitment::new(group);
    let x = cm.commit_i128(it.checksum as i128, &it.checksum_randomness);
    let s = cm.combine([&x, &it.corrector_commitment, forwarded]);
    if &s != it.square_proof.base() {
        return Err(Rejection::SumCommitment);
    }

    if !it.square_proof.verify(group) {
        return Err(Rejection::SquareProof);
    }

    Ok(())
}

fn checksums(challenge: &ChallengeMatrix, share: &[i64], field_modulus: i64) -> Result<Vec<i64>> {
    challenge
        .rows()
        .map(|row| inner_product(row, share).map(|ip| centered_mod(ip, field_modulus)))
        .collect()
}

fn check_share(share: &[i64], dimension: usize) -> Result<()> {
    if share.len() != dimension {
        return Err(P4PError::InvalidDimension {
            expected: dimension,
            got: share.len(),
        });
    }
    Ok(())
}
