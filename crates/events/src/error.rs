//! Outbox and publishing errors

use thiserror::Error;

/// Errors from outbox storage
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Outbox event not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Outbox persistence error: {0}")]
    Persistence(String),
}

/// Errors returned by a publisher. Always retryable from the relay's view.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to send event: {0}")]
    SendFailed(String),

    #[error("No subscribers for event {0}")]
    NoSubscribers(String),

    #[error("Publisher '{name}' rejected event: {reason}")]
    Rejected { name: String, reason: String },
}
