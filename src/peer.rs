//! The privacy peer: custody of the `v` shares for one round.

use std::collections::BTreeMap;

use tracing::debug;
use zeroize::Zeroizing;

use crate::challenge::ChallengeMatrix;
use crate::config::ProtocolContext;
use crate::error::{P4PError, Result};
use crate::field::{centered_mod, vector_add};
use crate::proof::{ForwardedCommitments, PeerProof};
use crate::verifier::peer_verify;

#[derive(Debug)]
pub struct PrivacyPeer {
    ctx: ProtocolContext,
    challenge: Option<ChallengeMatrix>,
    shares: BTreeMap<u64, Zeroizing<Vec<i64>>>,
}

impl PrivacyPeer {
    pub fn new(ctx: ProtocolContext) -> Self {
        Self {
            ctx,
            challenge: None,
            shares: BTreeMap::new(),
        }
    }

    /// Drops all shares of the previous round and adopts the new round's
    /// challenge matrix.
    pub fn begin_round(&mut self, challenge: ChallengeMatrix) -> Result<()> {
        let config = self.ctx.config();
        challenge.check_shape(config.iterations, config.dimension)?;
        self.challenge = Some(challenge);
        self.shares.clear();
        Ok(())
    }

    pub fn submit_share(&mut self, user: u64, share: &[i64]) -> Result<()> {
        let dimension = self.ctx.config().dimension;
        if share.len() != dimension {
            return Err(P4PError::InvalidDimension {
                expected: dimension,
                got: share.len(),
            });
        }
        let f = self.ctx.field_modulus();
        let reduced = share.iter().map(|&x| centered_mod(x as i128, f)).collect();
        self.shares.insert(user, Zeroizing::new(reduced));
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.shares.len()
    }

    /// Runs peer verification for `user` and returns the commitments to
    /// forward to the server.
    ///
    /// # Errors
    /// * `ProtocolState` if no round has begun
    /// * `UnknownUser` if the peer holds no share for `user`
    pub fn verify_user(&self, user: u64, proof: &PeerProof) -> Result<ForwardedCommitments> {
        let challenge = self.challenge.as_ref().ok_or_else(|| {
            P4PError::ProtocolState("Peer has no challenge matrix for this round".to_string())
        })?;
        let share = self.shares.get(&user).ok_or(P4PError::UnknownUser(user))?;
        peer_verify(&self.ctx, proof, share, challenge)
    }

    /// Sum of the shares of exactly the users the server accepted.
    ///
    /// # Errors
    /// * `UnknownUser` if an accepted user never gave the peer a share
    pub fn partial_sum(&self, accepted: &[u64]) -> Result<Vec<i64>> {
        let f = self.ctx.field_modulus();
        let mut sum = vec![0; self.ctx.config().dimension];
        for &user in accepted {
            let share = self.shares.get(&user).ok_or(P4PError::UnknownUser(user))?;
            sum = vector_add(&sum, share, f)?;
        }
        debug!(users = accepted.len(), held = self.shares.len(), "peer partial sum");
        Ok(sum)
    }
}
