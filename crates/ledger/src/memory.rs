//! In-memory ledger store

use crate::account::Account;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{next_link, CommitBatch, LedgerStore, PostingQuery};
use crate::transaction::{Posting, Transaction};
use crate::validation::validate_account_closable;
use agentpay_events::{EventError, InMemoryOutboxStore, OutboxEvent, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    /// Insertion order, for stable listings
    account_order: Vec<String>,
    transactions: HashMap<String, Transaction>,
    /// agent_id -> transaction ids by block_index
    chains: HashMap<String, Vec<String>>,
}

impl LedgerState {
    fn tail(&self, agent_id: &str) -> Option<&Transaction> {
        self.chains
            .get(agent_id)
            .and_then(|ids| ids.last())
            .and_then(|id| self.transactions.get(id))
    }
}

/// Ledger store kept in memory.
///
/// A commit runs every check before it touches anything, under one write lock.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
    outbox: InMemoryOutboxStore,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The outbox rows written alongside ledger mutations
    pub fn outbox(&self) -> &InMemoryOutboxStore {
        &self.outbox
    }

    /// Overwrite a stored balance without a posting. Used to simulate
    /// out-of-band corruption in tests.
    pub async fn overwrite_balance(&self, account_id: &str, balance: Decimal) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;
        account.balance = balance;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_account(&self, account: &Account, outbox: Vec<OutboxEvent>) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.id) {
            return Err(LedgerError::AlreadyExists {
                entity: "Account",
                id: account.id.clone(),
            });
        }

        self.outbox.enqueue(outbox).await?;
        state.account_order.push(account.id.clone());
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(id).cloned())
    }

    async fn list_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>> {
        let state = self.state.read().await;
        Ok(state
            .account_order
            .iter()
            .filter_map(|id| state.accounts.get(id))
            .filter(|a| a.agent_id == agent_id && a.is_active())
            .cloned()
            .collect())
    }

    async fn list_all_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>> {
        let state = self.state.read().await;
        Ok(state
            .account_order
            .iter()
            .filter_map(|id| state.accounts.get(id))
            .filter(|a| a.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn soft_delete_account(
        &self,
        id: &str,
        at: DateTime<Utc>,
        outbox: Vec<OutboxEvent>,
    ) -> LedgerResult<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(id)
            .filter(|a| a.is_active())
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        validate_account_closable(account)?;

        self.outbox.enqueue(outbox).await?;
        account.deleted_at = Some(at);
        account.updated_at = at;
        Ok(account.clone())
    }

    async fn commit(&self, batch: CommitBatch) -> LedgerResult<Transaction> {
        let CommitBatch { transaction, outbox } = batch;
        let mut state = self.state.write().await;

        // Checks first; nothing below the last check may fail.
        for posting in &transaction.postings {
            match state.accounts.get(&posting.account_id) {
                Some(a) if a.is_active() => {}
                _ => return Err(LedgerError::account_not_found(&posting.account_id)),
            }
        }

        let (expected_index, expected_prev) = next_link(state.tail(&transaction.agent_id));
        if transaction.previous_hash != expected_prev || transaction.block_index != expected_index {
            return Err(LedgerError::IntegrityViolation(format!(
                "chain tail for agent {} moved: expected index {} after {}, got index {} after {}",
                transaction.agent_id,
                expected_index,
                expected_prev,
                transaction.block_index,
                transaction.previous_hash
            )));
        }

        if state.transactions.contains_key(&transaction.id) {
            return Err(LedgerError::AlreadyExists {
                entity: "Transaction",
                id: transaction.id.clone(),
            });
        }

        self.outbox.enqueue(outbox).await?;

        let now = Utc::now();
        for posting in &transaction.postings {
            if let Some(account) = state.accounts.get_mut(&posting.account_id) {
                account.balance += posting.amount;
                account.updated_at = now;
            }
        }

        state
            .chains
            .entry(transaction.agent_id.clone())
            .or_default()
            .push(transaction.id.clone());
        state.transactions.insert(transaction.id.clone(), transaction.clone());

        Ok(transaction)
    }

    async fn get_transaction(&self, id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(id).cloned())
    }

    async fn latest_transaction(&self, agent_id: &str) -> LedgerResult<Option<Transaction>> {
        Ok(self.state.read().await.tail(agent_id).cloned())
    }

    async fn list_transactions(&self, agent_id: &str) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .chains
            .get(agent_id)
            .map(|ids| ids.iter().filter_map(|id| state.transactions.get(id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_postings(&self, query: &PostingQuery) -> LedgerResult<Vec<Posting>> {
        let state = self.state.read().await;
        let mut postings: Vec<Posting> = state
            .transactions
            .values()
            .flat_map(|tx| tx.postings.iter().filter(|p| query.matches(p, &tx.agent_id)))
            .cloned()
            .collect();
        postings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(postings)
    }
}

#[async_trait]
impl OutboxStore for InMemoryLedgerStore {
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<(), EventError> {
        self.outbox.enqueue(events).await
    }

    async fn fetch_publishable(&self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEvent>, EventError> {
        self.outbox.fetch_publishable(limit, max_retries).await
    }

    async fn mark_published(&self, id: &str) -> Result<(), EventError> {
        self.outbox.mark_published(id).await
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), EventError> {
        self.outbox.mark_failed(id, error).await
    }

    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>, EventError> {
        self.outbox.get(id).await
    }
}
