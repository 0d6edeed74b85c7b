//! SQLite-backed ledger store
//!
//! Decimals are stored as TEXT and timestamps as fixed-width RFC3339 TEXT.
//! A commit runs inside a `BEGIN IMMEDIATE` sqlx transaction, so the write
//! lock is held from the tail check through the balance updates. Errors,
//! cancellation and a failed `COMMIT` all end in a rollback.

use crate::account::{Account, AccountType};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{next_link, CommitBatch, LedgerStore, PostingQuery};
use crate::transaction::{Posting, Transaction, TransactionStatus};
use crate::validation::validate_account_closable;
use agentpay_core::CurrencyCode;
use agentpay_events::{EventError, OutboxEvent, OutboxStatus, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        name TEXT NOT NULL,
        account_type TEXT NOT NULL,
        currency TEXT NOT NULL,
        balance TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_accounts_agent ON accounts(agent_id)",
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        description TEXT NOT NULL,
        reference_id TEXT,
        status TEXT NOT NULL,
        amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        previous_hash TEXT NOT NULL,
        current_hash TEXT NOT NULL,
        block_index INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        posted_at TEXT,
        UNIQUE(agent_id, block_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS postings (
        id TEXT PRIMARY KEY,
        transaction_id TEXT NOT NULL REFERENCES transactions(id),
        account_id TEXT NOT NULL REFERENCES accounts(id),
        amount TEXT NOT NULL,
        currency TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_postings_account ON postings(account_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_postings_transaction ON postings(transaction_id)",
    r#"
    CREATE TABLE IF NOT EXISTS outbox_events (
        id TEXT PRIMARY KEY,
        event_type TEXT NOT NULL,
        aggregate_id TEXT NOT NULL,
        aggregate_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        metadata TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        published_at TEXT,
        error_message TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox_events(status, created_at)",
];

fn ts_to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn corrupt(what: &str, raw: &str, reason: impl std::fmt::Display) -> LedgerError {
    LedgerError::Persistence(format!("corrupt {} '{}': {}", what, raw, reason))
}

fn ts_from_db(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt("timestamp", raw, e))
}

fn opt_ts_from_db(raw: Option<String>) -> LedgerResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(ts_from_db).transpose()
}

fn decimal_from_db(raw: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| corrupt("decimal", raw, e))
}

fn currency_from_db(raw: &str) -> LedgerResult<CurrencyCode> {
    raw.parse().map_err(|e| corrupt("currency", raw, e))
}

fn row_to_account(row: &SqliteRow) -> LedgerResult<Account> {
    let account_type: String = row.try_get("account_type")?;
    let currency: String = row.try_get("currency")?;
    let balance: String = row.try_get("balance")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Account {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        name: row.try_get("name")?,
        account_type: AccountType::from_str(&account_type)
            .map_err(|e| corrupt("account type", &account_type, e))?,
        currency: currency_from_db(&currency)?,
        balance: decimal_from_db(&balance)?,
        created_at: ts_from_db(&created_at)?,
        updated_at: ts_from_db(&updated_at)?,
        deleted_at: opt_ts_from_db(row.try_get("deleted_at")?)?,
    })
}

fn row_to_posting(row: &SqliteRow) -> LedgerResult<Posting> {
    let amount: String = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Posting {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        account_id: row.try_get("account_id")?,
        amount: decimal_from_db(&amount)?,
        currency: currency_from_db(&currency)?,
        created_at: ts_from_db(&created_at)?,
    })
}

/// Transaction columns only; postings are attached by the caller
fn row_to_transaction(row: &SqliteRow) -> LedgerResult<Transaction> {
    let status: String = row.try_get("status")?;
    let amount: String = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let created_at: String = row.try_get("created_at")?;
    let block_index: i64 = row.try_get("block_index")?;

    Ok(Transaction {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        description: row.try_get("description")?,
        reference_id: row.try_get("reference_id")?,
        status: TransactionStatus::from_str(&status).map_err(|e| corrupt("status", &status, e))?,
        amount: decimal_from_db(&amount)?,
        currency: currency_from_db(&currency)?,
        previous_hash: row.try_get("previous_hash")?,
        current_hash: row.try_get("current_hash")?,
        block_index: u64::try_from(block_index)
            .map_err(|e| corrupt("block index", &block_index.to_string(), e))?,
        created_at: ts_from_db(&created_at)?,
        posted_at: opt_ts_from_db(row.try_get("posted_at")?)?,
        postings: Vec::new(),
    })
}

fn row_to_outbox(row: &SqliteRow) -> LedgerResult<OutboxEvent> {
    let payload: String = row.try_get("payload")?;
    let metadata: String = row.try_get("metadata")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    let status = match status.as_str() {
        "pending" => OutboxStatus::Pending,
        "published" => OutboxStatus::Published,
        "failed" => OutboxStatus::Failed,
        other => return Err(corrupt("outbox status", other, "unknown")),
    };

    Ok(OutboxEvent {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        payload: serde_json::from_str(&payload)?,
        metadata: serde_json::from_str(&metadata)?,
        status,
        created_at: ts_from_db(&created_at)?,
        updated_at: ts_from_db(&updated_at)?,
        published_at: opt_ts_from_db(row.try_get("published_at")?)?,
        error_message: row.try_get("error_message")?,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
    })
}

fn outbox_status_to_db(status: OutboxStatus) -> &'static str {
    match status {
        OutboxStatus::Pending => "pending",
        OutboxStatus::Published => "published",
        OutboxStatus::Failed => "failed",
    }
}

async fn insert_outbox(conn: &mut SqliteConnection, rows: &[OutboxEvent]) -> LedgerResult<()> {
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id, event_type, aggregate_id, aggregate_type, payload, metadata, status,
                created_at, updated_at, published_at, error_message, retry_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.event_type)
        .bind(&row.aggregate_id)
        .bind(&row.aggregate_type)
        .bind(serde_json::to_string(&row.payload)?)
        .bind(serde_json::to_string(&row.metadata)?)
        .bind(outbox_status_to_db(row.status))
        .bind(ts_to_db(&row.created_at))
        .bind(ts_to_db(&row.updated_at))
        .bind(row.published_at.as_ref().map(ts_to_db))
        .bind(&row.error_message)
        .bind(i64::from(row.retry_count))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn fetch_account(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Option<Account>> {
    let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_account).transpose()
}

/// The body of a commit. Runs inside an open `BEGIN IMMEDIATE` transaction.
async fn apply_commit(conn: &mut SqliteConnection, batch: &CommitBatch) -> LedgerResult<()> {
    let tx = &batch.transaction;

    // Net delta per account, applied once each
    let mut deltas: BTreeMap<&str, Decimal> = BTreeMap::new();
    for posting in &tx.postings {
        *deltas.entry(posting.account_id.as_str()).or_default() += posting.amount;
    }

    let mut accounts = Vec::with_capacity(deltas.len());
    for account_id in deltas.keys() {
        match fetch_account(conn, account_id).await? {
            Some(account) if account.is_active() => accounts.push(account),
            _ => return Err(LedgerError::account_not_found(*account_id)),
        }
    }

    let tail = sqlx::query("SELECT * FROM transactions WHERE agent_id = ? ORDER BY block_index DESC LIMIT 1")
        .bind(&tx.agent_id)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(row_to_transaction)
        .transpose()?;
    let (expected_index, expected_prev) = next_link(tail.as_ref());
    if tx.previous_hash != expected_prev || tx.block_index != expected_index {
        return Err(LedgerError::IntegrityViolation(format!(
            "chain tail for agent {} moved: expected index {} after {}, got index {} after {}",
            tx.agent_id, expected_index, expected_prev, tx.block_index, tx.previous_hash
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, agent_id, description, reference_id, status, amount, currency,
            previous_hash, current_hash, block_index, created_at, posted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.agent_id)
    .bind(&tx.description)
    .bind(&tx.reference_id)
    .bind(tx.status.to_string())
    .bind(tx.amount.to_string())
    .bind(tx.currency.as_str())
    .bind(&tx.previous_hash)
    .bind(&tx.current_hash)
    .bind(tx.block_index as i64)
    .bind(ts_to_db(&tx.created_at))
    .bind(tx.posted_at.as_ref().map(ts_to_db))
    .execute(&mut *conn)
    .await?;

    for posting in &tx.postings {
        sqlx::query(
            "INSERT INTO postings (id, transaction_id, account_id, amount, currency, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&posting.id)
        .bind(&posting.transaction_id)
        .bind(&posting.account_id)
        .bind(posting.amount.to_string())
        .bind(posting.currency.as_str())
        .bind(ts_to_db(&posting.created_at))
        .execute(&mut *conn)
        .await?;
    }

    let now = ts_to_db(&Utc::now());
    for account in &accounts {
        let delta = deltas.get(account.id.as_str()).copied().unwrap_or_default();
        sqlx::query("UPDATE accounts SET balance = ?, updated_at = ? WHERE id = ?")
            .bind((account.balance + delta).to_string())
            .bind(&now)
            .bind(&account.id)
            .execute(&mut *conn)
            .await?;
    }

    insert_outbox(conn, &batch.outbox).await
}

fn outbox_err(e: LedgerError) -> EventError {
    EventError::Persistence(e.to_string())
}

/// Ledger store on a SQLite database
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes
    pub async fn init(&self) -> LedgerResult<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn load_postings(&self, tx: &mut Transaction) -> LedgerResult<()> {
        let rows = sqlx::query("SELECT * FROM postings WHERE transaction_id = ? ORDER BY rowid")
            .bind(&tx.id)
            .fetch_all(&self.pool)
            .await?;
        tx.postings = rows.iter().map(row_to_posting).collect::<LedgerResult<_>>()?;
        Ok(())
    }

    async fn with_postings(&self, rows: Vec<SqliteRow>) -> LedgerResult<Vec<Transaction>> {
        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut tx = row_to_transaction(row)?;
            self.load_postings(&mut tx).await?;
            transactions.push(tx);
        }
        Ok(transactions)
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn create_account(&self, account: &Account, outbox: Vec<OutboxEvent>) -> LedgerResult<()> {
        let mut db_tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, agent_id, name, account_type, currency, balance, created_at, updated_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.agent_id)
        .bind(&account.name)
        .bind(account.account_type.to_string())
        .bind(account.currency.as_str())
        .bind(account.balance.to_string())
        .bind(ts_to_db(&account.created_at))
        .bind(ts_to_db(&account.updated_at))
        .bind(account.deleted_at.as_ref().map(ts_to_db))
        .execute(&mut *db_tx)
        .await;

        if let Err(sqlx::Error::Database(e)) = &result {
            if e.is_unique_violation() {
                return Err(LedgerError::AlreadyExists {
                    entity: "Account",
                    id: account.id.clone(),
                });
            }
        }
        result?;

        insert_outbox(&mut *db_tx, &outbox).await?;
        db_tx.commit().await?;
        Ok(())
    }

    async fn get_account(&self, id: &str) -> LedgerResult<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn list_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>> {
        let rows = sqlx::query(
            "SELECT * FROM accounts WHERE agent_id = ? AND deleted_at IS NULL ORDER BY created_at, rowid",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_account).collect()
    }

    async fn list_all_accounts(&self, agent_id: &str) -> LedgerResult<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts WHERE agent_id = ? ORDER BY created_at, rowid")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_account).collect()
    }

    async fn soft_delete_account(
        &self,
        id: &str,
        at: DateTime<Utc>,
        outbox: Vec<OutboxEvent>,
    ) -> LedgerResult<Account> {
        let mut db_tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        match fetch_account(&mut *db_tx, id).await? {
            Some(account) if account.is_active() => validate_account_closable(&account)?,
            _ => return Err(LedgerError::account_not_found(id)),
        }

        let result = sqlx::query(
            "UPDATE accounts SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(ts_to_db(&at))
        .bind(ts_to_db(&at))
        .bind(id)
        .execute(&mut *db_tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::account_not_found(id));
        }

        insert_outbox(&mut *db_tx, &outbox).await?;
        let account = fetch_account(&mut *db_tx, id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        db_tx.commit().await?;
        Ok(account)
    }

    async fn commit(&self, batch: CommitBatch) -> LedgerResult<Transaction> {
        // Dropped before `commit()` returns Ok, the guard rolls back
        let mut db_tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        apply_commit(&mut *db_tx, &batch).await?;
        db_tx.commit().await?;
        Ok(batch.transaction)
    }

    async fn get_transaction(&self, id: &str) -> LedgerResult<Option<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.with_postings(rows).await?.into_iter().next())
    }

    async fn latest_transaction(&self, agent_id: &str) -> LedgerResult<Option<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE agent_id = ? ORDER BY block_index DESC LIMIT 1")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.with_postings(rows).await?.into_iter().next())
    }

    async fn list_transactions(&self, agent_id: &str) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE agent_id = ? ORDER BY block_index")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        self.with_postings(rows).await
    }

    async fn list_postings(&self, query: &PostingQuery) -> LedgerResult<Vec<Posting>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.* FROM postings p JOIN transactions t ON t.id = p.transaction_id WHERE 1 = 1",
        );
        if let Some(agent_id) = &query.agent_id {
            qb.push(" AND t.agent_id = ").push_bind(agent_id.clone());
        }
        if let Some(account_id) = &query.account_id {
            qb.push(" AND p.account_id = ").push_bind(account_id.clone());
        }
        if let Some(since) = query.since {
            qb.push(" AND p.created_at > ").push_bind(ts_to_db(&since));
        }
        if let Some(until) = query.until {
            qb.push(" AND p.created_at <= ").push_bind(ts_to_db(&until));
        }
        qb.push(" ORDER BY p.created_at, p.id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_posting).collect()
    }
}

#[async_trait]
impl OutboxStore for SqliteLedgerStore {
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<(), EventError> {
        let mut db_tx = self.pool.begin().await.map_err(|e| outbox_err(e.into()))?;
        insert_outbox(&mut *db_tx, &events).await.map_err(outbox_err)?;
        db_tx.commit().await.map_err(|e| outbox_err(e.into()))
    }

    async fn fetch_publishable(&self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEvent>, EventError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?)
            ORDER BY created_at, rowid
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_retries))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| outbox_err(e.into()))?;

        rows.iter()
            .map(row_to_outbox)
            .collect::<LedgerResult<_>>()
            .map_err(outbox_err)
    }

    async fn mark_published(&self, id: &str) -> Result<(), EventError> {
        let now = ts_to_db(&Utc::now());
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'published', published_at = ?, updated_at = ?, error_message = NULL WHERE id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| outbox_err(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(EventError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), EventError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'failed', retry_count = retry_count + 1, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(ts_to_db(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| outbox_err(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(EventError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>, EventError> {
        let row = sqlx::query("SELECT * FROM outbox_events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| outbox_err(e.into()))?;
        row.as_ref().map(row_to_outbox).transpose().map_err(outbox_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_events::{DomainEvent, EventType};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteLedgerStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteLedgerStore::new(pool);
        store.init().await.unwrap();
        store
    }

    fn sealed(agent: &str, index: u64, prev: &str, legs: &[(&str, Decimal)]) -> Transaction {
        let id = format!("tx-{}-{}", agent, index);
        let now = Utc::now();
        let postings: Vec<Posting> = legs
            .iter()
            .enumerate()
            .map(|(i, (account, amount))| Posting {
                id: format!("{}-p{}", id, i),
                transaction_id: id.clone(),
                account_id: account.to_string(),
                amount: *amount,
                currency: CurrencyCode::USD,
                created_at: now,
            })
            .collect();
        Transaction {
            amount: Transaction::debit_total(&postings),
            id,
            agent_id: agent.to_string(),
            description: "test".to_string(),
            reference_id: Some("ref-1".to_string()),
            status: TransactionStatus::Posted,
            currency: CurrencyCode::USD,
            previous_hash: prev.to_string(),
            current_hash: String::new(),
            block_index: index,
            created_at: now,
            posted_at: Some(now),
            postings,
        }
        .seal()
    }

    async fn accounts(store: &SqliteLedgerStore) -> (Account, Account) {
        let cash = Account::new("agent-a", "Cash", AccountType::Asset, CurrencyCode::USD);
        let revenue = Account::new("agent-a", "Revenue", AccountType::Revenue, CurrencyCode::USD);
        store.create_account(&cash, vec![]).await.unwrap();
        store.create_account(&revenue, vec![]).await.unwrap();
        (cash, revenue)
    }

    #[tokio::test]
    async fn test_account_round_trip() {
        let store = store().await;
        let (cash, _) = accounts(&store).await;

        let loaded = store.get_account(&cash.id).await.unwrap().unwrap();
        assert_eq!(loaded, cash);
        assert_eq!(store.list_accounts("agent-a").await.unwrap().len(), 2);

        let dup = store.create_account(&cash, vec![]).await;
        assert!(matches!(dup, Err(LedgerError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_commit_persists_everything() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;

        let tx = sealed("agent-a", 0, "0", &[(cash.id.as_str(), dec!(100)), (revenue.id.as_str(), dec!(-100))]);
        let event = DomainEvent::new(EventType::TransactionPosted, &tx.id, "transaction", json!({"id": tx.id}));
        store
            .commit(CommitBatch {
                transaction: tx.clone(),
                outbox: vec![OutboxEvent::from_event(&event).unwrap()],
            })
            .await
            .unwrap();

        let loaded = store.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_hash, tx.current_hash);
        assert_eq!(loaded.postings.len(), 2);
        assert_eq!(loaded.created_at, tx.created_at);

        assert_eq!(store.get_account(&cash.id).await.unwrap().unwrap().balance, dec!(100));
        assert_eq!(store.get_account(&revenue.id).await.unwrap().unwrap().balance, dec!(-100));

        let pending = store.fetch_publishable(10, 3).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "transaction.posted");
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;

        let mut tx = sealed("agent-a", 0, "0", &[(cash.id.as_str(), dec!(5)), (revenue.id.as_str(), dec!(-5))]);
        // Second posting insert hits the primary key
        tx.postings[1].id = tx.postings[0].id.clone();

        let err = store
            .commit(CommitBatch {
                transaction: tx.clone(),
                outbox: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));

        assert!(store.get_transaction(&tx.id).await.unwrap().is_none());
        assert_eq!(store.get_account(&cash.id).await.unwrap().unwrap().balance, Decimal::ZERO);

        // The connection is usable again
        let ok = sealed("agent-a", 0, "0", &[(cash.id.as_str(), dec!(5)), (revenue.id.as_str(), dec!(-5))]);
        store
            .commit(CommitBatch {
                transaction: ok,
                outbox: vec![],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_commit_leaves_connection_clean() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;
        let legs = [(cash.id.as_str(), dec!(1)), (revenue.id.as_str(), dec!(-1))];

        // Drop commits at every await point the 1us budget happens to hit
        for _ in 0..20 {
            let tail = store.latest_transaction("agent-a").await.unwrap();
            let (index, prev) = next_link(tail.as_ref());
            let batch = CommitBatch {
                transaction: sealed("agent-a", index, &prev, &legs),
                outbox: vec![],
            };
            let _ = tokio::time::timeout(std::time::Duration::from_micros(1), store.commit(batch)).await;
        }

        // Every visible row came with its balance update, nothing half-applied
        let committed = store.list_transactions("agent-a").await.unwrap();
        let cash_balance = store.get_account(&cash.id).await.unwrap().unwrap().balance;
        assert_eq!(cash_balance, Decimal::from(committed.len() as u64));

        let tail = store.latest_transaction("agent-a").await.unwrap();
        let (index, prev) = next_link(tail.as_ref());
        store
            .commit(CommitBatch {
                transaction: sealed("agent-a", index, &prev, &legs),
                outbox: vec![],
            })
            .await
            .unwrap();
        assert_eq!(
            store.get_account(&cash.id).await.unwrap().unwrap().balance,
            Decimal::from(committed.len() as u64 + 1)
        );
    }

    #[tokio::test]
    async fn test_soft_delete_requires_zero_balance() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;
        let tx = sealed("agent-a", 0, "0", &[(cash.id.as_str(), dec!(7)), (revenue.id.as_str(), dec!(-7))]);
        store
            .commit(CommitBatch {
                transaction: tx.clone(),
                outbox: vec![],
            })
            .await
            .unwrap();

        let err = store.soft_delete_account(&cash.id, Utc::now(), vec![]).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(store.get_account(&cash.id).await.unwrap().unwrap().is_active());

        let reversal = sealed(
            "agent-a",
            1,
            &tx.current_hash,
            &[(revenue.id.as_str(), dec!(7)), (cash.id.as_str(), dec!(-7))],
        );
        store
            .commit(CommitBatch {
                transaction: reversal,
                outbox: vec![],
            })
            .await
            .unwrap();
        store.soft_delete_account(&cash.id, Utc::now(), vec![]).await.unwrap();

        assert_eq!(store.list_accounts("agent-a").await.unwrap().len(), 1);
        let all = store.list_all_accounts("agent-a").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|a| a.id == cash.id && a.deleted_at.is_some()));
    }

    #[tokio::test]
    async fn test_tail_mismatch_is_integrity_violation() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;
        let legs = [(cash.id.as_str(), dec!(1)), (revenue.id.as_str(), dec!(-1))];

        let first = sealed("agent-a", 0, "0", &legs);
        store
            .commit(CommitBatch {
                transaction: first,
                outbox: vec![],
            })
            .await
            .unwrap();

        let forked = sealed("agent-a", 1, "not-the-tail", &legs);
        let err = store
            .commit(CommitBatch {
                transaction: forked,
                outbox: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation(_)));
    }

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let store = store().await;
        let event = DomainEvent::new(EventType::AccountCreated, "acct-1", "account", json!({}));
        let row = OutboxEvent::from_event(&event).unwrap();
        store.enqueue(vec![row.clone()]).await.unwrap();

        store.mark_failed(&row.id, "broker down").await.unwrap();
        let failed = store.get(&row.id).await.unwrap().unwrap();
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("broker down"));

        assert_eq!(store.fetch_publishable(10, 1).await.unwrap().len(), 0);
        assert_eq!(store.fetch_publishable(10, 2).await.unwrap().len(), 1);

        store.mark_published(&row.id).await.unwrap();
        let published = store.get(&row.id).await.unwrap().unwrap();
        assert_eq!(published.status, OutboxStatus::Published);
        assert!(published.published_at.is_some());

        assert!(matches!(store.mark_published("missing").await, Err(EventError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_posting_query_window() {
        let store = store().await;
        let (cash, revenue) = accounts(&store).await;
        let legs = [(cash.id.as_str(), dec!(3)), (revenue.id.as_str(), dec!(-3))];

        let first = sealed("agent-a", 0, "0", &legs);
        let cutoff = first.created_at;
        store
            .commit(CommitBatch {
                transaction: first.clone(),
                outbox: vec![],
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = sealed("agent-a", 1, &first.current_hash, &legs);
        store
            .commit(CommitBatch {
                transaction: second,
                outbox: vec![],
            })
            .await
            .unwrap();

        let all = store.list_postings(&PostingQuery::for_account(&cash.id)).await.unwrap();
        assert_eq!(all.len(), 2);

        let early = store
            .list_postings(&PostingQuery::for_account(&cash.id).until(cutoff))
            .await
            .unwrap();
        assert_eq!(early.len(), 1);
    }
}
