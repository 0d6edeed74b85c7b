//! Audit storage port and the in-memory implementation

use crate::entry::AuditEntry;
use crate::error::AuditResult;
use crate::query::AuditQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use tokio::sync::RwLock;

/// Storage for audit entries.
///
/// Implementations never update an entry except for `archived`, and never delete.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// Filtered, newest-first, paged by `limit`/`offset`
    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>>;

    /// Flag entries with a timestamp before `before`; returns how many changed
    async fn archive_before(&self, before: DateTime<Utc>) -> AuditResult<u64>;
}

/// Audit store kept in memory
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entries as-is, without assigning ids or timestamps
    pub fn with_entries(entries: Vec<AuditEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;

        // Newest insert first, then a stable sort keeps that order on ties
        let mut hits: Vec<AuditEntry> = entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        hits.sort_by_key(|e| Reverse(e.timestamp));

        let page = hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(page)
    }

    async fn archive_before(&self, before: DateTime<Utc>) -> AuditResult<u64> {
        let mut entries = self.entries.write().await;
        let mut archived = 0;

        for entry in entries.iter_mut() {
            if !entry.archived && entry.timestamp.is_some_and(|ts| ts < before) {
                entry.archived = true;
                archived += 1;
            }
        }

        Ok(archived)
    }
}
