//! Transactions and postings

use agentpay_core::CurrencyCode;
use agentpay_hashchain::{hash_transaction, ChainedRecord, PostingHashData, TransactionHashData};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Posted,
    Failed,
}

/// One leg of a transaction. Positive amount = debit, negative = credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
}

impl Posting {
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_positive()
    }
}

/// A committed set of postings, chained to the agent's previous transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub agent_id: String,
    pub description: String,
    pub reference_id: Option<String>,
    pub status: TransactionStatus,
    /// Total of the debit legs
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub previous_hash: String,
    pub current_hash: String,
    /// Position in the agent's chain, starting at 0
    pub block_index: u64,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// The fields the transaction hash commits to
    pub fn hash_data(&self) -> TransactionHashData {
        TransactionHashData {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            description: self.description.clone(),
            amount: self.amount,
            currency: self.currency,
            timestamp: self.created_at,
            previous_hash: self.previous_hash.clone(),
            postings: self
                .postings
                .iter()
                .map(|p| PostingHashData {
                    account_id: p.account_id.clone(),
                    amount: p.amount,
                    currency: p.currency,
                })
                .collect(),
        }
    }

    /// Sum of all legs; zero for any valid transaction
    pub fn posting_sum(&self) -> Decimal {
        self.postings.iter().map(|p| p.amount).sum()
    }

    /// Total of the positive legs
    pub fn debit_total(postings: &[Posting]) -> Decimal {
        postings
            .iter()
            .filter(|p| p.amount > Decimal::ZERO)
            .map(|p| p.amount)
            .sum()
    }

    /// Fill `current_hash` from the other fields
    pub fn seal(mut self) -> Self {
        self.current_hash = hash_transaction(&self.hash_data());
        self
    }
}

impl ChainedRecord for Transaction {
    fn index(&self) -> u64 {
        self.block_index
    }

    fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    fn current_hash(&self) -> &str {
        &self.current_hash
    }

    fn payload(&self) -> String {
        self.id.clone()
    }

    fn compute_hash(&self) -> String {
        hash_transaction(&self.hash_data())
    }
}

/// One requested leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingInput {
    pub account_id: String,
    pub amount: Decimal,
    /// Defaults to the account's currency
    pub currency: Option<String>,
}

impl PostingInput {
    pub fn new(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
            currency: None,
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Request to post a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransaction {
    pub agent_id: String,
    pub description: String,
    pub reference_id: Option<String>,
    pub postings: Vec<PostingInput>,
}

impl PostTransaction {
    pub fn new(agent_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            description: description.into(),
            reference_id: None,
            postings: Vec::new(),
        }
    }

    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn leg(mut self, account_id: impl Into<String>, amount: Decimal) -> Self {
        self.postings.push(PostingInput::new(account_id, amount));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_hashchain::verify_records;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn posting(tx: &str, account: &str, amount: Decimal) -> Posting {
        Posting {
            id: format!("{}-{}", tx, account),
            transaction_id: tx.to_string(),
            account_id: account.to_string(),
            amount,
            currency: CurrencyCode::USD,
            created_at: Utc::now(),
        }
    }

    fn transaction(id: &str, index: u64, previous_hash: &str) -> Transaction {
        let postings = vec![posting(id, "cash", dec!(25)), posting(id, "revenue", dec!(-25))];
        Transaction {
            id: id.to_string(),
            agent_id: "agent-a".to_string(),
            description: "Sale".to_string(),
            reference_id: None,
            status: TransactionStatus::Posted,
            amount: Transaction::debit_total(&postings),
            currency: CurrencyCode::USD,
            previous_hash: previous_hash.to_string(),
            current_hash: String::new(),
            block_index: index,
            created_at: Utc::now() + Duration::seconds(index as i64),
            posted_at: Some(Utc::now()),
            postings,
        }
        .seal()
    }

    #[test]
    fn test_seal_and_verify() {
        let tx = transaction("tx-1", 0, "0");
        assert_eq!(tx.amount, dec!(25));
        assert_eq!(tx.posting_sum(), Decimal::ZERO);
        assert_eq!(tx.current_hash.len(), 64);
        assert_eq!(tx.compute_hash(), tx.current_hash);
    }

    #[test]
    fn test_chain_of_transactions() {
        let first = transaction("tx-1", 0, "0");
        let second = transaction("tx-2", 1, &first.current_hash);
        let mut chain = vec![first, second];

        assert!(verify_records(&chain, "0").valid);

        chain[0].description = "Altered".to_string();
        let result = verify_records(&chain, "0");
        assert!(!result.valid);
        assert_eq!(result.first_break.map(|b| b.index), Some(0));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(TransactionStatus::Posted.to_string(), "posted");
        assert_eq!("failed".parse::<TransactionStatus>().unwrap(), TransactionStatus::Failed);
    }
}
