//! Hash chain errors

use thiserror::Error;

/// Errors from chain mutation and journal persistence.
///
/// Verification findings are not errors; see `ChainVerification`.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chain has no genesis block")]
    NotInitialized,

    #[error("Chain already initialized with {0} block(s)")]
    AlreadyInitialized(usize),

    #[error("Journal IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid journal line {line}: {reason}")]
    InvalidJournal { line: usize, reason: String },

    #[error("Append task failed: {0}")]
    Task(String),
}
