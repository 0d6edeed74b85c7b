//! Outbox rows and the storage port they live behind

use crate::error::EventError;
use crate::event::DomainEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;

/// Publishing status of an outbox row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

/// A persisted event awaiting (or done with) publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl OutboxEvent {
    /// Build a pending outbox row from a domain event.
    ///
    /// The row id is the event id, so a consumer can deduplicate on it.
    pub fn from_event(event: &DomainEvent) -> Result<Self, EventError> {
        Ok(Self {
            id: event.id.clone(),
            event_type: event.event_type.to_string(),
            aggregate_id: event.aggregate_id.clone(),
            aggregate_type: event.aggregate_type.clone(),
            payload: event.data.clone(),
            metadata: serde_json::to_value(&event.metadata)?,
            status: OutboxStatus::Pending,
            created_at: event.timestamp,
            updated_at: event.timestamp,
            published_at: None,
            error_message: None,
            retry_count: 0,
        })
    }

    /// Whether the relay should (re)publish this row
    pub fn is_publishable(&self, max_retries: u32) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => self.retry_count < max_retries,
            OutboxStatus::Published => false,
        }
    }
}

/// Storage port for outbox rows.
///
/// Ledger stores implement this over the same database as their business
/// tables so rows can be written in the mutating unit of work.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert rows outside of any ledger mutation
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<(), EventError>;

    /// Pending rows plus failed rows under the retry limit, oldest first
    async fn fetch_publishable(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<OutboxEvent>, EventError>;

    async fn mark_published(&self, id: &str) -> Result<(), EventError>;

    /// Record a failed attempt and bump the retry count
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), EventError>;

    /// Look up one row
    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>, EventError>;
}

/// Outbox kept in memory (tests, single-process deployments)
#[derive(Default)]
pub struct InMemoryOutboxStore {
    rows: RwLock<Vec<OutboxEvent>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row
    pub async fn all(&self) -> Vec<OutboxEvent> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, events: Vec<OutboxEvent>) -> Result<(), EventError> {
        self.rows.write().await.extend(events);
        Ok(())
    }

    async fn fetch_publishable(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<OutboxEvent>, EventError> {
        let rows = self.rows.read().await;
        let mut batch: Vec<OutboxEvent> = rows
            .iter()
            .filter(|row| row.is_publishable(max_retries))
            .cloned()
            .collect();
        batch.sort_by_key(|row| row.created_at);
        batch.truncate(limit);
        Ok(batch)
    }

    async fn mark_published(&self, id: &str) -> Result<(), EventError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| EventError::NotFound(id.to_string()))?;

        let now = Utc::now();
        row.status = OutboxStatus::Published;
        row.published_at = Some(now);
        row.updated_at = now;
        row.error_message = None;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), EventError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| EventError::NotFound(id.to_string()))?;

        row.status = OutboxStatus::Failed;
        row.retry_count += 1;
        row.error_message = Some(error.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<OutboxEvent>, EventError> {
        Ok(self.rows.read().await.iter().find(|row| row.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use serde_json::json;

    fn row() -> OutboxEvent {
        let event = DomainEvent::new(EventType::TransactionPosted, "tx-1", "transaction", json!({}));
        OutboxEvent::from_event(&event).unwrap()
    }

    #[test]
    fn test_from_event_is_pending() {
        let row = row();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.event_type, "transaction.posted");
        assert_eq!(row.retry_count, 0);
        assert_eq!(row.metadata["correlation_id"], "tx-1");
    }

    #[test]
    fn test_publishable_rules() {
        let mut row = row();
        assert!(row.is_publishable(3));

        row.status = OutboxStatus::Failed;
        row.retry_count = 2;
        assert!(row.is_publishable(3));
        row.retry_count = 3;
        assert!(!row.is_publishable(3));

        row.status = OutboxStatus::Published;
        assert!(!row.is_publishable(3));
    }

    #[tokio::test]
    async fn test_in_memory_lifecycle() {
        let store = InMemoryOutboxStore::new();
        let first = row();
        let second = row();
        store.enqueue(vec![first.clone(), second.clone()]).await.unwrap();

        assert_eq!(store.fetch_publishable(10, 3).await.unwrap().len(), 2);
        assert_eq!(store.fetch_publishable(1, 3).await.unwrap().len(), 1);

        store.mark_published(&first.id).await.unwrap();
        store.mark_failed(&second.id, "broker down").await.unwrap();

        let published = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(published.status, OutboxStatus::Published);
        assert!(published.published_at.is_some());

        let failed = store.get(&second.id).await.unwrap().unwrap();
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("broker down"));

        let batch = store.fetch_publishable(10, 3).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, second.id);
    }

    #[tokio::test]
    async fn test_mark_unknown_row() {
        let store = InMemoryOutboxStore::new();
        let result = store.mark_published("missing").await;
        assert!(matches!(result, Err(EventError::NotFound(_))));
    }
}
