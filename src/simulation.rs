//! In-process driver that plays all three parties of one round.

use rand::{CryptoRng, Rng, RngCore};
use tracing::{info, instrument};

use crate::aggregator::Aggregator;
use crate::config::ProtocolContext;
use crate::error::Result;
use crate::field::{random_vector_with_norm, vector_add};
use crate::peer::PrivacyPeer;
use crate::prover::ProofBuilder;
use crate::sharing::{SecretSplitter, UserVector};

/// Norm of a generated vector relative to `L`, for users meant to pass.
const PASSING_NORM_FACTOR: f64 = 0.5;
/// Norm of a generated vector relative to `L`, for users meant to fail.
const FAILING_NORM_FACTOR: f64 = 2.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationReport {
    pub round: u64,
    /// Aggregate computed by the two aggregators
    pub aggregate: Vec<i64>,
    /// Plaintext sum over the accepted users, for comparison
    pub expected: Vec<i64>,
    pub accepted: Vec<u64>,
    pub disqualified: Vec<u64>,
    pub submitted: usize,
}

impl SimulationReport {
    /// True if the secret-shared aggregate equals the plaintext sum.
    pub fn is_consistent(&self) -> bool {
        self.aggregate == self.expected
    }
}

/// Draws a user vector whose norm is `L / 2` if `within_bound`, else `2L`.
pub fn generate_user_vector<R: RngCore + CryptoRng>(
    ctx: &ProtocolContext,
    within_bound: bool,
    rng: &mut R,
) -> Vec<i64> {
    let config = ctx.config();
    let factor = if within_bound {
        PASSING_NORM_FACTOR
    } else {
        FAILING_NORM_FACTOR
    };
    let target = config.norm_bound() as f64 * factor;
    random_vector_with_norm(config.dimension, config.field_modulus, target, rng)
}

/// Draws `count` user vectors, each within the bound with probability 1/2.
pub fn generate_population<R: RngCore + CryptoRng>(
    ctx: &ProtocolContext,
    count: usize,
    rng: &mut R,
) -> Vec<Vec<i64>> {
    (0..count)
        .map(|_| {
            let within = rng.gen_bool(0.5);
            generate_user_vector(ctx, within, rng)
        })
        .collect()
}

/// Runs one complete round: challenge generation, per-user sharing and
/// proof construction, peer verification and forwarding, server
/// verification, the peer's partial sum and finalization. User `i` gets id
/// `i`.
#[instrument(skip_all, level = "debug", fields(users = users.len()))]
pub fn simulate_round<R: RngCore + CryptoRng>(
    ctx: &ProtocolContext,
    users: &[Vec<i64>],
    rng: &mut R,
) -> Result<SimulationReport> {
    let f = ctx.field_modulus();
    let splitter = SecretSplitter::new(f)?;
    let mut aggregator = Aggregator::new(ctx.clone())?;
    let mut peer = PrivacyPeer::new(ctx.clone());

    aggregator.reset_round();
    let challenge = aggregator.generate_challenge_matrix(rng)?;
    peer.begin_round(challenge.clone())?;

    let mut vectors = Vec::with_capacity(users.len());
    for (id, data) in users.iter().enumerate() {
        let id = id as u64;
        let data = UserVector::new(data, f);
        let shares = splitter.split(&data, rng);

        aggregator.submit_user_share(id, shares.server_share())?;
        peer.submit_share(id, shares.peer_share())?;

        let proof = ProofBuilder::new(ctx)
            .shares(&shares)
            .challenge(&challenge)
            .build(rng)?;
        let (server_proof, peer_proof) = proof.into_halves();
        aggregator.submit_user_proof(id, server_proof)?;

        let forwarded = peer.verify_user(id, &peer_proof)?;
        aggregator.submit_forwarded_commitments(id, forwarded)?;
        vectors.push(data);
    }

    aggregator.verify_submissions()?;
    let accepted = aggregator.qualified_users();
    let peer_sum = peer.partial_sum(&accepted)?;
    let outcome = aggregator.finalize_round(&peer_sum)?;

    let mut expected = vec![0; ctx.config().dimension];
    for &id in &outcome.accepted {
        expected = vector_add(&expected, vectors[id as usize].values(), f)?;
    }

    let report = SimulationReport {
        round: aggregator.round(),
        aggregate: outcome.aggregate,
        expected,
        accepted: outcome.accepted,
        disqualified: outcome.disqualified,
        submitted: outcome.submitted,
    };
    info!(
        qualified = report.accepted.len(),
        submitted = report.submitted,
        consistent = report.is_consistent(),
        "simulated round complete"
    );
    Ok(report)
}
