use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum P4PError {
    /// Static parameters that can never produce a working party.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid dimension: expected {expected}, got {got}")]
    InvalidDimension {
        expected: usize,
        got: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation ran before the step it depends on.
    #[error("Protocol state error: {0}")]
    ProtocolState(String),

    /// An invariant that holds by construction was violated. Callers must
    /// treat this as fatal.
    #[error("Internal arithmetic defect: {0}")]
    ArithmeticDefect(String),

    #[error("Unknown user: {0}")]
    UnknownUser(u64),
}

pub type Result<T> = std::result::Result<T, P4PError>;
