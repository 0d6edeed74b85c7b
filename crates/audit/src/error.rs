//! Audit errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt audit record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

impl From<sqlx::Error> for AuditError {
    fn from(e: sqlx::Error) -> Self {
        AuditError::Persistence(e.to_string())
    }
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
