//! Outstanding items for reconciliation and aging

use crate::error::BalanceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};
use tokio::sync::RwLock;

/// Kind of item not yet cleared by the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutstandingKind {
    /// Issued but not yet presented
    Check,
    /// Recorded in the books, not yet credited by the bank
    Deposit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingItem {
    pub id: String,
    pub description: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub kind: OutstandingKind,
}

/// Where uncleared checks and deposits come from
#[async_trait]
pub trait OutstandingItemSource: Send + Sync {
    /// Items for an account dated on or before `as_of`
    async fn outstanding_items(&self, account_id: &str, as_of: DateTime<Utc>) -> BalanceResult<Vec<OutstandingItem>>;
}

/// Source that never has anything outstanding
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutstandingItems;

#[async_trait]
impl OutstandingItemSource for NoOutstandingItems {
    async fn outstanding_items(&self, _account_id: &str, _as_of: DateTime<Utc>) -> BalanceResult<Vec<OutstandingItem>> {
        Ok(Vec::new())
    }
}

/// Items registered by hand, keyed by account
#[derive(Default)]
pub struct InMemoryOutstandingItems {
    items: RwLock<HashMap<String, Vec<OutstandingItem>>>,
}

impl InMemoryOutstandingItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, account_id: impl Into<String>, item: OutstandingItem) {
        self.items.write().await.entry(account_id.into()).or_default().push(item);
    }
}

#[async_trait]
impl OutstandingItemSource for InMemoryOutstandingItems {
    async fn outstanding_items(&self, account_id: &str, as_of: DateTime<Utc>) -> BalanceResult<Vec<OutstandingItem>> {
        let items = self.items.read().await;
        Ok(items
            .get(account_id)
            .map(|list| list.iter().filter(|i| i.date <= as_of).cloned().collect())
            .unwrap_or_default())
    }
}
