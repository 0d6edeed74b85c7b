//! AgentPay Balances - derived balance reports
//!
//! Nothing here writes to the ledger. Every report is computed from live
//! account balances or by replaying postings.

pub mod calculator;
pub mod config;
pub mod error;
pub mod outstanding;
pub mod report;

pub use calculator::BalanceCalculator;
pub use config::BalanceConfig;
pub use error::{BalanceError, BalanceResult};
pub use outstanding::{
    InMemoryOutstandingItems, NoOutstandingItems, OutstandingItem, OutstandingItemSource, OutstandingKind,
};
pub use report::{
    AccountBalance, AgingBucket, AgingReport, BalanceHistory, BalancePoint, BalanceSheet, IntegrityIssue,
    IntegrityReport, ReconciliationResult, TrialBalance, TrialBalanceLine,
};
