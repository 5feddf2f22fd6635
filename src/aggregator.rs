//! Server-side state of one aggregation round.
//!
//! A round starts with [`Aggregator::reset_round`] and a fresh challenge
//! matrix. Users then submit their server shares and proofs, and the privacy
//! peer's forwarded commitments arrive per user. Verification disqualifies
//! every rejected user and the remaining shares are summed with the peer's
//! partial sum over the same accepted set.

use std::collections::{BTreeMap, BTreeSet};

use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::challenge::{ChallengeGenerator, ChallengeMatrix};
use crate::config::ProtocolContext;
use crate::error::{P4PError, Result};
use crate::field::{centered_mod, vector_add};
use crate::proof::{ForwardedCommitments, ServerProof};
use crate::verifier::server_verify;

#[derive(Debug, Default)]
struct UserRecord {
    share: Zeroizing<Vec<i64>>,
    proof: Option<ServerProof>,
    forwarded: Option<ForwardedCommitments>,
    verdict: Option<bool>,
}

/// Result of a finalized round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    /// `sum of accepted user vectors mod F`
    pub aggregate: Vec<i64>,
    pub accepted: Vec<u64>,
    pub disqualified: Vec<u64>,
    /// Number of users that submitted a share this round
    pub submitted: usize,
}

impl RoundOutcome {
    pub fn qualified(&self) -> usize {
        self.accepted.len()
    }
}

#[derive(Debug)]
pub struct Aggregator {
    ctx: ProtocolContext,
    generator: ChallengeGenerator,
    round: u64,
    challenge: Option<ChallengeMatrix>,
    users: BTreeMap<u64, UserRecord>,
    disqualified: BTreeSet<u64>,
}

impl Aggregator {
    pub fn new(ctx: ProtocolContext) -> Result<Self> {
        let generator = ChallengeGenerator::from_config(ctx.config())?;
        Ok(Self {
            ctx,
            generator,
            round: 0,
            challenge: None,
            users: BTreeMap::new(),
            disqualified: BTreeSet::new(),
        })
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.ctx
    }

    /// Number of rounds started so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Clears all per-user state and the challenge matrix, and starts a new
    /// round.
    pub fn reset_round(&mut self) {
        self.round += 1;
        self.challenge = None;
        self.users.clear();
        self.disqualified.clear();
        debug!(round = self.round, "round reset");
    }

    /// Draws the round's challenge matrix.
    ///
    /// # Errors
    /// * `ProtocolState` if no round was started or the round already has a
    ///   matrix
    pub fn generate_challenge_matrix<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ChallengeMatrix> {
        if self.round == 0 {
            return Err(P4PError::ProtocolState(
                "reset_round must be called before generating a challenge matrix".to_string(),
            ));
        }
        if self.challenge.is_some() {
            return Err(P4PError::ProtocolState(format!(
                "Round {} already has a challenge matrix",
                self.round
            )));
        }
        let matrix = self.generator.generate(rng);
        self.challenge = Some(matrix.clone());
        Ok(matrix)
    }

    pub fn challenge_matrix(&self) -> Option<&ChallengeMatrix> {
        self.challenge.as_ref()
    }

    /// Records a user's server share `u`, reduced into the field.
    pub fn submit_user_share(&mut self, user: u64, share: &[i64]) -> Result<()> {
        let dimension = self.ctx.config().dimension;
        if share.len() != dimension {
            return Err(P4PError::InvalidDimension {
                expected: dimension,
                got: share.len(),
            });
        }
        self.ensure_not_disqualified(user)?;

        let f = self.ctx.field_modulus();
        let record = self.users.entry(user).or_default();
        record.share = Zeroizing::new(share.iter().map(|&x| centered_mod(x as i128, f)).collect());
        record.verdict = None;
        Ok(())
    }

    pub fn submit_user_proof(&mut self, user: u64, proof: ServerProof) -> Result<()> {
        self.ensure_challenge()?;
        let record = self.record_mut(user)?;
        record.proof = Some(proof);
        record.verdict = None;
        Ok(())
    }

    pub fn submit_forwarded_commitments(
        &mut self,
        user: u64,
        forwarded: ForwardedCommitments,
    ) -> Result<()> {
        self.ensure_challenge()?;
        let record = self.record_mut(user)?;
        record.forwarded = Some(forwarded);
        record.verdict = None;
        Ok(())
    }

    /// Removes a user from the round. Returns whether the user was present.
    pub fn disqualify(&mut self, user: u64) -> bool {
        let present = self.users.remove(&user).is_some();
        if present {
            self.disqualified.insert(user);
        }
        present
    }

    pub fn qualified_user_count(&self) -> usize {
        self.users.len()
    }

    /// Ids of users still in the round, in ascending order.
    pub fn qualified_users(&self) -> Vec<u64> {
        self.users.keys().copied().collect()
    }

    /// Runs server verification for every user without a verdict and
    /// disqualifies the rejected ones. A user who sent a share but no proof
    /// is rejected like any other failing user.
    ///
    /// Verdicts are cached, so calling this again only verifies users whose
    /// submissions changed.
    ///
    /// # Errors
    /// * `ProtocolState` if the round has no challenge matrix, or a user with
    ///   a proof has no forwarded commitments. No user is disqualified then.
    #[instrument(skip_all, level = "debug", fields(round = self.round))]
    pub fn verify_submissions(&mut self) -> Result<BTreeMap<u64, bool>> {
        let challenge = self.ensure_challenge()?;

        let mut unproven = Vec::new();
        let mut pending = Vec::new();
        for (&user, record) in self.users.iter().filter(|(_, r)| r.verdict.is_none()) {
            let Some(proof) = record.proof.as_ref() else {
                unproven.push(user);
                continue;
            };
            let forwarded = record.forwarded.as_ref().ok_or_else(|| {
                P4PError::ProtocolState(format!(
                    "User {} has no forwarded commitments; peer verification must run first",
                    user
                ))
            })?;
            pending.push((user, proof, forwarded, record.share.as_slice()));
        }

        let ctx = &self.ctx;
        let verdicts = pending
            .into_par_iter()
            .map(|(user, proof, forwarded, share)| {
                server_verify(ctx, proof, forwarded, share, challenge).map(|ok| (user, ok))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut results = BTreeMap::new();
        for (user, ok) in verdicts {
            if ok {
                if let Some(record) = self.users.get_mut(&user) {
                    record.verdict = Some(true);
                }
            } else {
                debug!(user, "user disqualified");
                self.disqualify(user);
            }
            results.insert(user, ok);
        }
        for user in unproven {
            debug!(user, "no proof submitted, user disqualified");
            self.disqualify(user);
            results.insert(user, false);
        }
        Ok(results)
    }

    /// Verifies any outstanding submissions, sums the accepted server shares
    /// and adds the peer's partial sum over the same accepted set.
    ///
    /// # Errors
    /// * `InvalidDimension` if `peer_sum` has the wrong length
    /// * any error of [`Aggregator::verify_submissions`]
    #[instrument(skip_all, level = "debug", fields(round = self.round))]
    pub fn finalize_round(&mut self, peer_sum: &[i64]) -> Result<RoundOutcome> {
        let dimension = self.ctx.config().dimension;
        if peer_sum.len() != dimension {
            return Err(P4PError::InvalidDimension {
                expected: dimension,
                got: peer_sum.len(),
            });
        }

        self.verify_submissions()?;

        let f = self.ctx.field_modulus();
        let server_sum = self
            .users
            .par_iter()
            .map(|(_, record)| Ok(record.share.to_vec()))
            .try_reduce(|| vec![0; dimension], |a, b| vector_add(&a, &b, f))?;
        let aggregate = vector_add(&server_sum, peer_sum, f)?;

        let outcome = RoundOutcome {
            aggregate,
            accepted: self.qualified_users(),
            disqualified: self.disqualified.iter().copied().collect(),
            submitted: self.users.len() + self.disqualified.len(),
        };
        info!(
            round = self.round,
            qualified = outcome.qualified(),
            submitted = outcome.submitted,
            "round finalized"
        );
        Ok(outcome)
    }

    fn ensure_challenge(&self) -> Result<&ChallengeMatrix> {
        self.challenge.as_ref().ok_or_else(|| {
            P4PError::ProtocolState(format!(
                "Round {} has no challenge matrix; generate one first",
                self.round
            ))
        })
    }

    fn ensure_not_disqualified(&self, user: u64) -> Result<()> {
        if self.disqualified.contains(&user) {
            return Err(P4PError::ProtocolState(format!(
                "User {} was disqualified in round {}",
                user, self.round
            )));
        }
        Ok(())
    }

    fn record_mut(&mut self, user: u64) -> Result<&mut UserRecord> {
        self.users.get_mut(&user).ok_or(P4PError::UnknownUser(user))
    }
}
