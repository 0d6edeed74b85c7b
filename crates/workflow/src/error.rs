//! Workflow errors

use crate::payment::WorkflowStatus;
use agentpay_events::EventError;
use agentpay_hashchain::ChainError;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a risk, consent or execution collaborator
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid payment request: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Payment {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: WorkflowStatus,
        actual: WorkflowStatus,
    },

    #[error("{step} timed out after {}", format_timeout(.timeout))]
    DownstreamTimeout { step: String, timeout: Duration },

    #[error("Risk evaluation denied payment: {0}")]
    Denied(String),

    #[error("Consent rejected: {0}")]
    ConsentRejected(String),

    #[error("{step} failed: {source}")]
    Collaborator {
        step: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("Payment chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    pub fn payment_not_found(id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            entity: "Payment",
            id: id.into(),
        }
    }
}

/// `30s` for whole seconds, `250ms` otherwise
fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = WorkflowError::DownstreamTimeout {
            step: "risk_evaluation".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "risk_evaluation timed out after 30s");

        let err = WorkflowError::DownstreamTimeout {
            step: "execution".to_string(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "execution timed out after 50ms");
    }
}
