//! Balance integrity configuration

use agentpay_ledger::AccountType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds for `validate_balance_integrity`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Balances beyond this magnitude are flagged
    #[serde(default = "default_max_abs_balance")]
    pub max_abs_balance: Decimal,

    /// Every agent is expected to hold at least one account of each type
    #[serde(default = "default_required_account_types")]
    pub required_account_types: Vec<AccountType>,
}

fn default_max_abs_balance() -> Decimal {
    Decimal::from(1_000_000)
}

fn default_required_account_types() -> Vec<AccountType> {
    AccountType::ALL.to_vec()
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            max_abs_balance: default_max_abs_balance(),
            required_account_types: default_required_account_types(),
        }
    }
}
