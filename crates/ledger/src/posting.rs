//! Posting Engine - the only path that changes a balance
//!
//! Flow for a post: Validate → Resolve accounts → Lock agent chain →
//! Link to tail → Seal → Commit → Audit

use crate::account::{Account, NewAccount};
use crate::error::{LedgerError, LedgerResult};
use crate::locks::AgentLocks;
use crate::store::{next_link, CommitBatch, SharedLedgerStore};
use crate::transaction::{PostTransaction, Posting, Transaction, TransactionStatus};
use crate::validation::{
    validate_account_closable, validate_against_accounts, validate_new_account, validate_post_request,
};
use agentpay_audit::{AuditEventType, AuditTrail};
use agentpay_core::new_id;
use agentpay_events::{DomainEvent, EventType, OutboxEvent};
use agentpay_hashchain::{verify_records, ChainVerification, GENESIS_PREVIOUS_HASH};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Double-entry posting engine
pub struct PostingEngine {
    store: SharedLedgerStore,
    audit: Arc<AuditTrail>,
    locks: Arc<AgentLocks>,
}

impl PostingEngine {
    pub fn new(store: SharedLedgerStore, audit: Arc<AuditTrail>, locks: Arc<AgentLocks>) -> Self {
        Self { store, audit, locks }
    }

    pub fn store(&self) -> &SharedLedgerStore {
        &self.store
    }

    /// Open an account with a zero balance
    pub async fn create_account(&self, request: NewAccount) -> LedgerResult<Account> {
        let currency = validate_new_account(&request)?;
        let account = Account::new(&request.agent_id, &request.name, request.account_type, currency);
        let snapshot = serde_json::to_value(&account)?;

        let event = DomainEvent::new(EventType::AccountCreated, &account.id, "account", snapshot.clone());
        self.store
            .create_account(&account, vec![OutboxEvent::from_event(&event)?])
            .await?;

        tracing::info!(
            account_id = %account.id,
            agent_id = %account.agent_id,
            account_type = %account.account_type,
            currency = %account.currency,
            "Account created"
        );

        if let Err(e) = self
            .audit
            .log_account_event(
                AuditEventType::AccountCreated,
                &account.id,
                &account.agent_id,
                format!("Created {} account '{}'", account.account_type, account.name),
                None,
                Some(snapshot),
            )
            .await
        {
            tracing::warn!(account_id = %account.id, error = %e, "Failed to audit account creation");
        }

        Ok(account)
    }

    /// Fetch an account, soft-deleted ones included
    pub async fn get_account(&self, id: &str) -> LedgerResult<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Mark an account deleted. It keeps its history but rejects new postings.
    pub async fn soft_delete_account(&self, id: &str) -> LedgerResult<Account> {
        let before = self.get_account(id).await?;
        if !before.is_active() {
            return Err(LedgerError::account_not_found(id));
        }
        validate_account_closable(&before)?;

        let now = Utc::now();
        let event = DomainEvent::new(
            EventType::AccountDeleted,
            id,
            "account",
            json!({ "id": id, "agent_id": before.agent_id, "deleted_at": now }),
        );
        let after = self
            .store
            .soft_delete_account(id, now, vec![OutboxEvent::from_event(&event)?])
            .await?;

        tracing::info!(account_id = %id, agent_id = %after.agent_id, "Account soft-deleted");

        if let Err(e) = self
            .audit
            .log_account_event(
                AuditEventType::AccountDeleted,
                id,
                &after.agent_id,
                format!("Deleted account '{}'", after.name),
                Some(serde_json::to_value(&before)?),
                Some(serde_json::to_value(&after)?),
            )
            .await
        {
            tracing::warn!(account_id = %id, error = %e, "Failed to audit account deletion");
        }

        Ok(after)
    }

    /// Post a balanced transaction.
    ///
    /// Nothing is written unless every check passes and the store commit succeeds.
    pub async fn post_transaction(&self, request: PostTransaction) -> LedgerResult<Transaction> {
        // 1. Shape
        validate_post_request(&request)?;

        // 2-4. Existence, ownership, currency
        let mut accounts = HashMap::new();
        for posting in &request.postings {
            if accounts.contains_key(&posting.account_id) {
                continue;
            }
            if let Some(account) = self.store.get_account(&posting.account_id).await? {
                accounts.insert(account.id.clone(), account);
            }
        }
        let (currency, resolved) = validate_against_accounts(&request, &accounts)?;

        // 5. Link to the agent's tail under its chain lock
        let transaction = {
            let _guard = self.locks.acquire(&request.agent_id).await;

            let tail = self.store.latest_transaction(&request.agent_id).await?;
            let (block_index, previous_hash) = next_link(tail.as_ref());

            let id = new_id();
            let now = Utc::now();
            let postings: Vec<Posting> = request
                .postings
                .iter()
                .zip(resolved)
                .map(|(input, currency)| Posting {
                    id: new_id(),
                    transaction_id: id.clone(),
                    account_id: input.account_id.clone(),
                    amount: input.amount,
                    currency,
                    created_at: now,
                })
                .collect();

            let transaction = Transaction {
                amount: Transaction::debit_total(&postings),
                id,
                agent_id: request.agent_id.clone(),
                description: request.description.clone(),
                reference_id: request.reference_id.clone(),
                status: TransactionStatus::Posted,
                currency,
                previous_hash,
                current_hash: String::new(),
                block_index,
                created_at: now,
                posted_at: Some(now),
                postings,
            }
            .seal();

            // 6. Atomic commit
            let outbox = outbox_rows(&transaction)?;
            self.store.commit(CommitBatch { transaction, outbox }).await?
        };

        tracing::info!(
            transaction_id = %transaction.id,
            agent_id = %transaction.agent_id,
            block_index = transaction.block_index,
            amount = %transaction.amount,
            "Transaction posted"
        );

        // 7. Audit, best effort
        let snapshot = json!({
            "amount": transaction.amount,
            "currency": transaction.currency,
            "current_hash": transaction.current_hash,
            "previous_hash": transaction.previous_hash,
            "block_index": transaction.block_index,
            "postings": transaction.postings.len(),
        });
        if let Err(e) = self
            .audit
            .log_transaction_event(
                AuditEventType::TransactionPosted,
                &transaction.id,
                &transaction.agent_id,
                transaction.description.clone(),
                Some(snapshot),
            )
            .await
        {
            tracing::warn!(transaction_id = %transaction.id, error = %e, "Failed to audit posted transaction");
        }

        Ok(transaction)
    }

    pub async fn get_transaction(&self, id: &str) -> LedgerResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(id))
    }

    /// Walk the agent's transaction chain from genesis
    pub async fn verify_agent_chain(&self, agent_id: &str) -> LedgerResult<ChainVerification> {
        let transactions = self.store.list_transactions(agent_id).await?;
        let result = verify_records(&transactions, GENESIS_PREVIOUS_HASH);
        if let Some(brk) = &result.first_break {
            tracing::warn!(agent_id, %brk, "Transaction chain broken");
        }
        Ok(result)
    }
}

/// `transaction.posted` plus one `balance.updated` for the agent
fn outbox_rows(transaction: &Transaction) -> LedgerResult<Vec<OutboxEvent>> {
    let postings: Vec<_> = transaction
        .postings
        .iter()
        .map(|p| json!({ "account_id": p.account_id, "amount": p.amount, "currency": p.currency }))
        .collect();

    let posted = DomainEvent::new(
        EventType::TransactionPosted,
        &transaction.id,
        "transaction",
        json!({
            "id": transaction.id,
            "agent_id": transaction.agent_id,
            "description": transaction.description,
            "reference_id": transaction.reference_id,
            "amount": transaction.amount,
            "currency": transaction.currency,
            "block_index": transaction.block_index,
            "current_hash": transaction.current_hash,
            "postings": postings,
        }),
    );

    let mut deltas: BTreeMap<&str, Decimal> = BTreeMap::new();
    for posting in &transaction.postings {
        *deltas.entry(posting.account_id.as_str()).or_default() += posting.amount;
    }
    let balance_updated = DomainEvent::new(
        EventType::BalanceUpdated,
        &transaction.agent_id,
        "agent",
        json!({ "transaction_id": transaction.id, "deltas": deltas }),
    );

    let correlate = |mut event: DomainEvent| {
        event.metadata.correlation_id = transaction.id.clone();
        event
    };

    Ok(vec![
        OutboxEvent::from_event(&correlate(posted))?,
        OutboxEvent::from_event(&correlate(balance_updated))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::memory::InMemoryLedgerStore;
    use crate::store::LedgerStore;
    use agentpay_audit::{AuditEntry, AuditError, AuditQuery, AuditResult, AuditStore, InMemoryAuditStore};
    use agentpay_events::OutboxStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: PostingEngine,
        store: Arc<InMemoryLedgerStore>,
        audit: Arc<AuditTrail>,
        cash: Account,
        revenue: Account,
    }

    async fn fixture_with(audit_store: Arc<dyn AuditStore>) -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let audit = Arc::new(AuditTrail::new(audit_store));
        let engine = PostingEngine::new(store.clone(), audit.clone(), Arc::new(AgentLocks::new()));

        let cash = engine
            .create_account(NewAccount::new("agent-a", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let revenue = engine
            .create_account(NewAccount::new("agent-a", "Revenue", AccountType::Revenue))
            .await
            .unwrap();

        Fixture {
            engine,
            store,
            audit,
            cash,
            revenue,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryAuditStore::new())).await
    }

    fn sale(f: &Fixture, amount: Decimal) -> PostTransaction {
        PostTransaction::new("agent-a", "Sale")
            .leg(&f.cash.id, amount)
            .leg(&f.revenue.id, -amount)
    }

    #[tokio::test]
    async fn test_post_updates_balances_and_chain() {
        let f = fixture().await;

        let first = f.engine.post_transaction(sale(&f, dec!(100))).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Posted);
        assert_eq!(first.block_index, 0);
        assert_eq!(first.previous_hash, "0");
        assert_eq!(first.current_hash.len(), 64);
        assert!(first.current_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first.amount, dec!(100));

        let second = f.engine.post_transaction(sale(&f, dec!(20.50))).await.unwrap();
        assert_eq!(second.block_index, 1);
        assert_eq!(second.previous_hash, first.current_hash);

        assert_eq!(f.engine.get_account(&f.cash.id).await.unwrap().balance, dec!(120.50));
        assert_eq!(f.engine.get_account(&f.revenue.id).await.unwrap().balance, dec!(-120.50));

        let verification = f.engine.verify_agent_chain("agent-a").await.unwrap();
        assert!(verification.valid);
        assert_eq!(verification.checked, 2);
    }

    #[tokio::test]
    async fn test_unbalanced_post_changes_nothing() {
        let f = fixture().await;
        let outbox_before = f.store.outbox().all().await.len();

        let request = PostTransaction::new("agent-a", "Bad")
            .leg(&f.cash.id, dec!(100))
            .leg(&f.revenue.id, dec!(-99.99));
        let err = f.engine.post_transaction(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert_eq!(f.engine.get_account(&f.cash.id).await.unwrap().balance, Decimal::ZERO);
        assert!(f.store.list_transactions("agent-a").await.unwrap().is_empty());
        assert_eq!(f.store.outbox().all().await.len(), outbox_before);
    }

    #[tokio::test]
    async fn test_foreign_account_is_rejected() {
        let f = fixture().await;
        let other = f
            .engine
            .create_account(NewAccount::new("agent-b", "Cash", AccountType::Asset))
            .await
            .unwrap();

        let request = PostTransaction::new("agent-a", "Steal")
            .leg(&f.cash.id, dec!(5))
            .leg(&other.id, dec!(-5));
        let err = f.engine.post_transaction(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Ownership { ref owner_id, .. } if owner_id == "agent-b"));
    }

    #[tokio::test]
    async fn test_deleted_account_rejects_postings() {
        let f = fixture().await;
        f.engine.soft_delete_account(&f.revenue.id).await.unwrap();

        let err = f.engine.post_transaction(sale(&f, dec!(1))).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "Account", .. }));

        let history = f.audit.get_change_history("account", &f.revenue.id).await.unwrap();
        let types: Vec<_> = history.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![AuditEventType::AccountCreated, AuditEventType::AccountDeleted]);
    }

    #[tokio::test]
    async fn test_funded_account_cannot_be_deleted() {
        let f = fixture().await;
        f.engine.post_transaction(sale(&f, dec!(100))).await.unwrap();

        let err = f.engine.soft_delete_account(&f.cash.id).await.unwrap_err();
        match err {
            LedgerError::Validation(errors) => assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["balance"]),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(f.engine.get_account(&f.cash.id).await.unwrap().is_active());
        assert_eq!(f.store.list_accounts("agent-a").await.unwrap().len(), 2);

        // Emptied accounts close normally
        let refund = PostTransaction::new("agent-a", "Refund")
            .leg(&f.revenue.id, dec!(100))
            .leg(&f.cash.id, dec!(-100));
        f.engine.post_transaction(refund).await.unwrap();
        let closed = f.engine.soft_delete_account(&f.cash.id).await.unwrap();
        assert!(closed.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_currency_mismatch_is_validation() {
        let f = fixture().await;
        let request = PostTransaction {
            postings: vec![
                crate::PostingInput::new(&f.cash.id, dec!(1)).currency("EUR"),
                crate::PostingInput::new(&f.revenue.id, dec!(-1)),
            ],
            ..PostTransaction::new("agent-a", "FX")
        };
        let err = f.engine.post_transaction(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_post_writes_outbox_and_audit() {
        let f = fixture().await;
        let tx = f.engine.post_transaction(sale(&f, dec!(10))).await.unwrap();

        let rows = f.store.fetch_publishable(100, 5).await.unwrap();
        let types: Vec<_> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert!(types.contains(&"transaction.posted"));
        assert!(types.contains(&"balance.updated"));
        assert!(types.contains(&"account.created"));

        let entries = f
            .audit
            .query_audit_trail(AuditQuery::for_resource("transaction", &tx.id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, AuditEventType::TransactionPosted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_posts_keep_one_chain() {
        let f = Arc::new(fixture().await);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let f = f.clone();
                tokio::spawn(async move { f.engine.post_transaction(sale(&f, dec!(1.25))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(f.engine.get_account(&f.cash.id).await.unwrap().balance, dec!(12.50));
        let verification = f.engine.verify_agent_chain("agent-a").await.unwrap();
        assert!(verification.valid);
        assert_eq!(verification.checked, 10);
    }

    struct BrokenAuditStore;

    #[async_trait]
    impl AuditStore for BrokenAuditStore {
        async fn insert(&self, _entry: &AuditEntry) -> AuditResult<()> {
            Err(AuditError::Persistence("disk full".to_string()))
        }

        async fn query(&self, _query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
            Ok(Vec::new())
        }

        async fn archive_before(&self, _before: chrono::DateTime<Utc>) -> AuditResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_post() {
        let f = fixture_with(Arc::new(BrokenAuditStore)).await;
        let tx = f.engine.post_transaction(sale(&f, dec!(3))).await.unwrap();
        assert_eq!(f.engine.get_transaction(&tx.id).await.unwrap().id, tx.id);
    }
}
