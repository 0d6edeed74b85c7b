//! Ledger accounts

use agentpay_core::{new_id, CurrencyCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Side on which an account type normally carries its balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum NormalSide {
    Debit,
    Credit,
}

/// Account type following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Resources owned (cash, receivables)
    Asset,
    /// Obligations owed to others
    Liability,
    /// Owner's stake
    Equity,
    /// Income earned
    Revenue,
    /// Costs incurred
    Expense,
}

impl AccountType {
    /// Every type, in balance-sheet order
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    /// Returns the normal balance side for this type.
    ///
    /// - Assets and Expenses increase on Debit
    /// - Liabilities, Equity, and Revenue increase on Credit
    pub fn normal_side(&self) -> NormalSide {
        match self {
            AccountType::Asset | AccountType::Expense => NormalSide::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => NormalSide::Credit,
        }
    }
}

/// A ledger bucket owned by one agent.
///
/// `balance` is the signed sum of every posting against the account
/// (debits positive, credits negative) and only changes inside a ledger commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub account_type: AccountType,
    pub currency: CurrencyCode,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// A fresh zero-balance account
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        currency: CurrencyCode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            agent_id: agent_id.into(),
            name: name.into(),
            account_type,
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Created on or before `at` and not yet deleted at that instant
    pub fn was_open_at(&self, at: DateTime<Utc>) -> bool {
        self.created_at <= at && self.deleted_at.map_or(true, |deleted| deleted > at)
    }
}

/// Request to open an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub agent_id: String,
    pub name: String,
    pub account_type: AccountType,
    /// Defaults to USD
    pub currency: Option<String>,
}

impl NewAccount {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            account_type,
            currency: None,
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_sides() {
        assert_eq!(AccountType::Asset.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Expense.normal_side(), NormalSide::Debit);
        assert_eq!(AccountType::Liability.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Equity.normal_side(), NormalSide::Credit);
        assert_eq!(AccountType::Revenue.normal_side(), NormalSide::Credit);
    }

    #[test]
    fn test_type_parse_and_display() {
        assert_eq!("asset".parse::<AccountType>().unwrap(), AccountType::Asset);
        assert_eq!("Revenue".parse::<AccountType>().unwrap(), AccountType::Revenue);
        assert!("income".parse::<AccountType>().is_err());
        assert_eq!(AccountType::Liability.to_string(), "liability");
    }

    #[test]
    fn test_new_account_starts_at_zero() {
        let account = Account::new("agent-a", "Cash", AccountType::Asset, CurrencyCode::USD);
        assert_eq!(account.balance, Decimal::ZERO);
        assert!(account.is_active());
        assert_eq!(account.id.len(), 36);
    }
}
