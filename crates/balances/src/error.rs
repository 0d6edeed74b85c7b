//! Balance calculator errors

use agentpay_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Outstanding item lookup failed: {0}")]
    OutstandingItems(String),
}

impl BalanceError {
    pub fn account_not_found(id: impl Into<String>) -> Self {
        BalanceError::NotFound {
            entity: "Account",
            id: id.into(),
        }
    }
}

pub type BalanceResult<T> = Result<T, BalanceError>;
