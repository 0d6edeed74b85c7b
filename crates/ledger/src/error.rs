//! Ledger errors

use std::fmt;
use thiserror::Error;

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every field-level problem found in a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-field failure
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    /// `Ok(())` if nothing was collected
    pub fn into_result(self) -> Result<(), LedgerError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Account {account_id} belongs to agent {owner_id}, not {agent_id}")]
    Ownership {
        account_id: String,
        agent_id: String,
        owner_id: String,
    },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn account_not_found(id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: "Account",
            id: id.into(),
        }
    }

    pub fn transaction_not_found(id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: "Transaction",
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

impl From<agentpay_events::EventError> for LedgerError {
    fn from(e: agentpay_events::EventError) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

impl From<agentpay_hashchain::ChainError> for LedgerError {
    fn from(e: agentpay_hashchain::ChainError) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
