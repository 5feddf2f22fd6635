//! Privacy-preserving aggregation of bounded-norm vectors.
//!
//! Each user splits a private vector over a small prime field into two
//! additive shares, one for the server and one for a non-colluding privacy
//! peer, and proves in zero knowledge that the vector's L2 norm is below a
//! public bound. The two aggregators verify the proof jointly, drop every
//! user whose proof fails, and combine the remaining shares into the sum.
//!
//! The proof checks the bound through random ternary checksums: for a
//! shared `N x m` challenge matrix, `sum_k (c_k . d)^2` concentrates around
//! `N * |d|^2 / 2`. The prover commits to every checksum, proves each square,
//! and decomposes `2 * sum(s_k^2)` into committed bits; a decomposition longer
//! than `ceil(log2 N) + 2l` bits is rejected.

pub mod aggregator;
pub mod challenge;
pub mod commitment;
pub mod config;
pub mod error;
pub mod field;
pub mod group;
pub mod membership;
pub mod peer;
pub mod proof;
pub mod prover;
pub mod sharing;
pub mod simulation;
pub mod square;
pub mod transcript;
pub mod verifier;


pub use aggregator::{Aggregator, RoundOutcome};
pub use challenge::{ChallengeDigest, ChallengeGenerator, ChallengeMatrix};
pub use commitment::{Opening, PedersenCommitment};
pub use config::{ProtocolConfig, ProtocolContext};
pub use error::{P4PError, Result};
pub use group::{GroupElement, GroupParameters, Scalar, DEFAULT_GENERATOR_SEED};
pub use membership::{BitCommitment, MembershipProof, ThreeWayCommitment};
pub use peer::PrivacyPeer;
pub use proof::{ForwardedCommitments, IterationProof, L2NormBoundProof, PeerProof, ServerProof};
pub use prover::ProofBuilder;
pub use sharing::{split, SecretSplitter, SharePair, UserVector};
pub use simulation::{simulate_round, SimulationReport};
pub use square::SquareProof;
pub use verifier::{peer_verify, server_verify};
