//! Proof artifacts of the L2-norm-bound protocol.
//!
//! The prover emits one [`L2NormBoundProof`] and immediately splits it: the
//! server receives the [`ServerProof`], the privacy peer the [`PeerProof`].
//! The peer turns its half into [`ForwardedCommitments`] for the server.

use crate::challenge::ChallengeDigest;
use crate::group::{GroupElement, Scalar};
use crate::membership::{BitCommitment, ThreeWayCommitment};
use crate::square::SquareProof;

/// Server-side record of one checksum iteration `k`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterationProof {
    /// `x_k = c_k . u mod F`
    pub(crate) checksum: i64,
    /// `r_x_k`
    pub(crate) checksum_randomness: Scalar,
    /// Commitment to the modular corrector `b_k`
    pub(crate) corrector_commitment: GroupElement,
    pub(crate) corrector_proof: ThreeWayCommitment,
    /// Links `S_k = X_k * B_k * Y_k` to a commitment of `s_k^2`
    pub(crate) square_proof: SquareProof,
}

impl IterationProof {
    pub fn checksum(&self) -> i64 {
        self.checksum
    }

    pub fn checksum_randomness(&self) -> &Scalar {
        &self.checksum_randomness
    }

    pub fn corrector_commitment(&self) -> &GroupElement {
        &self.corrector_commitment
    }

    pub fn corrector_proof(&self) -> &ThreeWayCommitment {
        &self.corrector_proof
    }

    pub fn square_proof(&self) -> &SquareProof {
        &self.square_proof
    }
}

/// The half of the proof the server verifies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerProof {
    pub(crate) challenge_digest: ChallengeDigest,
    pub(crate) iterations: Vec<IterationProof>,
    /// Bit decomposition of `2 * sum(s_k^2)`, least significant bit first
    pub(crate) bit_proofs: Vec<BitCommitment>,
    /// Commitment to `2 * sum(s_k^2)`
    pub(crate) sum_commitment: GroupElement,
}

impl ServerProof {
    /// Digest of the challenge matrix the proof was built against.
    pub fn challenge_digest(&self) -> &ChallengeDigest {
        &self.challenge_digest
    }

    pub fn iterations(&self) -> &[IterationProof] {
        &self.iterations
    }

    pub fn bit_proofs(&self) -> &[BitCommitment] {
        &self.bit_proofs
    }

    pub fn sum_commitment(&self) -> &GroupElement {
        &self.sum_commitment
    }
}

/// The half of the proof the privacy peer consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerProof {
    /// `y_k = c_k . v mod F` as stated by the prover
    pub(crate) checksums: Vec<i64>,
    /// `r_y_k`
    pub(crate) randomness: Vec<Scalar>,
}

impl PeerProof {
    pub fn checksums(&self) -> &[i64] {
        &self.checksums
    }

    pub fn randomness(&self) -> &[Scalar] {
        &self.randomness
    }
}

/// Both halves, as produced by the prover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2NormBoundProof {
    server: ServerProof,
    peer: PeerProof,
}

impl L2NormBoundProof {
    pub(crate) fn new(server: ServerProof, peer: PeerProof) -> Self {
        Self { server, peer }
    }

    pub fn server(&self) -> &ServerProof {
        &self.server
    }

    pub fn peer(&self) -> &PeerProof {
        &self.peer
    }

    /// Splits the proof for delivery to the two aggregators.
    pub fn into_halves(self) -> (ServerProof, PeerProof) {
        (self.server, self.peer)
    }
}

/// The peer's commitments `Y_k = Commit(y_k, r_y_k)`, forwarded to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardedCommitments {
    pub(crate) challenge_digest: ChallengeDigest,
    pub(crate) commitments: Vec<GroupElement>,
}

impl ForwardedCommitments {
    /// Digest of the challenge matrix the peer used.
    pub fn challenge_digest(&self) -> &ChallengeDigest {
        &self.challenge_digest
    }

    pub fn commitments(&self) -> &[GroupElement] {
        &self.commitments
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }
}
