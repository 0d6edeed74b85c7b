//! Ledger storage port

use crate::account::Account;
use crate::error::LedgerResult;
use crate::transaction::{Posting, Transaction};
use agentpay_events::OutboxEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything one post writes, applied all-or-nothing
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub transaction: Transaction,
    pub outbox: Vec<OutboxEvent>,
}

/// Posting filter. `since` is exclusive, `until` inclusive.
#[derive(Debug, Clone, Default)]
pub struct PostingQuery {
    pub agent_id: Option<String>,
    pub account_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl PostingQuery {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Default::default()
        }
    }

    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Default::default()
        }
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, posting: &Posting, agent_id: &str) -> bool {
        self.agent_id.as_deref().map_or(true, |a| a == agent_id)
            && self.account_id.as_deref().map_or(true, |a| a == posting.account_id)
            && self.since.map_or(true, |s| posting.created_at > s)
            && self.until.map_or(true, |u| posting.created_at <= u)
    }
}

/// Persistence for accounts, transactions and the outbox rows they produce.
///
/// `commit` is the only operation that changes a balance.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new account together with its outbox rows
    async fn create_account(&self, account: &Account, outbox: Vec<OutboxEvent>) -> LedgerResult<()>;

    /// Fetch an account, soft-deleted ones included
    async fn get_account(&self, id: &str) -> LedgerResult<Option<Account>>;

    /// Active accounts of an agent, oldest first
    async fn list_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>>;

    /// Every account of an agent, soft-deleted ones included, oldest first
    async fn list_all_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>>;

    /// Set `deleted_at`. Returns the updated account.
    async fn soft_delete_account(
        &self,
        id: &str,
        at: DateTime<Utc>,
        outbox: Vec<OutboxEvent>,
    ) -> LedgerResult<Account>;

    /// Atomically insert the transaction and postings, apply balance deltas
    /// and insert outbox rows.
    ///
    /// Fails with `IntegrityViolation` if the agent's chain tail no longer
    /// equals `transaction.previous_hash`.
    async fn commit(&self, batch: CommitBatch) -> LedgerResult<Transaction>;

    async fn get_transaction(&self, id: &str) -> LedgerResult<Option<Transaction>>;

    /// The agent's chain tail
    async fn latest_transaction(&self, agent_id: &str) -> LedgerResult<Option<Transaction>>;

    /// The agent's transactions ordered by `block_index`
    async fn list_transactions(&self, agent_id: &str) -> LedgerResult<Vec<Transaction>>;

    /// Postings ordered by creation time
    async fn list_postings(&self, query: &PostingQuery) -> LedgerResult<Vec<Posting>>;
}

/// Shared handle to a ledger store
pub type SharedLedgerStore = Arc<dyn LedgerStore>;

/// Tail values for the next transaction of a chain
pub(crate) fn next_link(tail: Option<&Transaction>) -> (u64, String) {
    match tail {
        Some(tx) => (tx.block_index + 1, tx.current_hash.clone()),
        None => (0, agentpay_hashchain::GENESIS_PREVIOUS_HASH.to_string()),
    }
}
