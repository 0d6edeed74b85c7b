//! Derived balance reports

use crate::outstanding::OutstandingItem;
use agentpay_core::CurrencyCode;
use agentpay_hashchain::ChainBreak;
use agentpay_ledger::{Account, AccountType, NormalSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter};

/// Balance snapshot for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: String,
    pub account_name: String,
    pub account_type: AccountType,
    /// Signed ledger balance (debits positive)
    pub current_balance: Decimal,
    pub available_balance: Decimal,
    /// Balance expressed on the account's normal side
    pub normal_balance: Decimal,
    pub currency: CurrencyCode,
    pub last_updated: DateTime<Utc>,
}

impl AccountBalance {
    /// Snapshot with an explicit balance (live or replayed)
    pub fn with_balance(account: &Account, balance: Decimal) -> Self {
        let normal_balance = match account.account_type.normal_side() {
            NormalSide::Debit => balance,
            NormalSide::Credit => -balance,
        };
        Self {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            account_type: account.account_type,
            current_balance: balance,
            available_balance: balance,
            normal_balance,
            currency: account.currency,
            last_updated: account.updated_at,
        }
    }
}

impl From<&Account> for AccountBalance {
    fn from(account: &Account) -> Self {
        Self::with_balance(account, account.balance)
    }
}

/// Assets, liabilities and equity at a point in time.
///
/// Totals are on each section's normal side, so liabilities and equity are
/// positive in a healthy ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub agent_id: String,
    pub as_of: DateTime<Utc>,
    pub assets: Vec<AccountBalance>,
    pub total_assets: Decimal,
    pub liabilities: Vec<AccountBalance>,
    pub total_liabilities: Decimal,
    pub equity: Vec<AccountBalance>,
    pub total_equity: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account_id: String,
    pub account_name: String,
    pub account_type: AccountType,
    /// Always non-negative
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub agent_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub debit_balances: Vec<TrialBalanceLine>,
    pub credit_balances: Vec<TrialBalanceLine>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub is_balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub account_id: String,
    pub book_balance: Decimal,
    pub bank_balance: Decimal,
    pub outstanding_checks: Vec<OutstandingItem>,
    pub deposits_in_transit: Vec<OutstandingItem>,
    pub reconciled_balance: Decimal,
    /// reconciled minus bank
    pub difference: Decimal,
    pub reconciliation_date: DateTime<Utc>,
    pub is_reconciled: bool,
}

/// Age bucket of an outstanding item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    #[strum(serialize = "current")]
    Current,
    #[serde(rename = "30_days")]
    #[strum(serialize = "30_days")]
    Days30,
    #[serde(rename = "60_days")]
    #[strum(serialize = "60_days")]
    Days60,
    #[serde(rename = "90_days")]
    #[strum(serialize = "90_days")]
    Days90,
    #[serde(rename = "120_plus")]
    #[strum(serialize = "120_plus")]
    Days120Plus,
}

impl AgingBucket {
    /// Bucket for an item this many days old
    pub fn for_age(days: i64) -> Self {
        match days {
            d if d < 30 => AgingBucket::Current,
            d if d < 60 => AgingBucket::Days30,
            d if d < 90 => AgingBucket::Days60,
            d if d < 120 => AgingBucket::Days90,
            _ => AgingBucket::Days120Plus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub account_id: String,
    pub as_of: DateTime<Utc>,
    /// Every bucket is present, zero when empty
    pub buckets: BTreeMap<AgingBucket, Decimal>,
    pub total: Decimal,
}

/// Balance right after one transaction touched the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePoint {
    pub at: DateTime<Utc>,
    pub transaction_id: String,
    pub delta: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    pub account_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Balance from every posting before `start`
    pub opening_balance: Decimal,
    pub points: Vec<BalancePoint>,
    pub closing_balance: Decimal,
}

/// One integrity finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    OutOfRange { account_id: String, balance: Decimal, limit: Decimal },
    MissingAccountType { account_type: AccountType },
    BalanceDrift { account_id: String, stored: Decimal, replayed: Decimal },
    DeletedWithBalance { account_id: String, balance: Decimal },
    UnbalancedTransaction { transaction_id: String, sum: Decimal },
    ChainBroken { chain_break: ChainBreak },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::OutOfRange { account_id, balance, limit } => {
                write!(f, "Account {} has suspicious balance {} (limit {})", account_id, balance, limit)
            }
            IntegrityIssue::MissingAccountType { account_type } => {
                write!(f, "Missing required account type: {}", account_type)
            }
            IntegrityIssue::BalanceDrift { account_id, stored, replayed } => write!(
                f,
                "Account {} balance {} differs from posting total {}",
                account_id, stored, replayed
            ),
            IntegrityIssue::DeletedWithBalance { account_id, balance } => {
                write!(f, "Deleted account {} still carries balance {}", account_id, balance)
            }
            IntegrityIssue::UnbalancedTransaction { transaction_id, sum } => {
                write!(f, "Transaction {} postings sum to {}", transaction_id, sum)
            }
            IntegrityIssue::ChainBroken { chain_break } => write!(f, "{}", chain_break),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub agent_id: String,
    pub total_accounts: usize,
    pub issues: Vec<IntegrityIssue>,
    pub is_valid: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aging_bucket_edges() {
        assert_eq!(AgingBucket::for_age(0), AgingBucket::Current);
        assert_eq!(AgingBucket::for_age(29), AgingBucket::Current);
        assert_eq!(AgingBucket::for_age(30), AgingBucket::Days30);
        assert_eq!(AgingBucket::for_age(89), AgingBucket::Days60);
        assert_eq!(AgingBucket::for_age(119), AgingBucket::Days90);
        assert_eq!(AgingBucket::for_age(400), AgingBucket::Days120Plus);
        assert_eq!(AgingBucket::Days120Plus.to_string(), "120_plus");
    }

    #[test]
    fn test_issue_serializes_with_kind() {
        let issue = IntegrityIssue::MissingAccountType {
            account_type: AccountType::Expense,
        };
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["kind"], "missing_account_type");
        assert_eq!(value["account_type"], "expense");
    }
}
