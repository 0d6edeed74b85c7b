//! Domain events emitted by the ledger and the payment workflow

use agentpay_core::new_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};

/// Event type codes, rendered as dotted strings on the wire
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum EventType {
    #[serde(rename = "transaction.posted")]
    #[strum(serialize = "transaction.posted")]
    TransactionPosted,

    #[serde(rename = "balance.updated")]
    #[strum(serialize = "balance.updated")]
    BalanceUpdated,

    #[serde(rename = "account.created")]
    #[strum(serialize = "account.created")]
    AccountCreated,

    #[serde(rename = "account.deleted")]
    #[strum(serialize = "account.deleted")]
    AccountDeleted,

    #[serde(rename = "ledger.anchored")]
    #[strum(serialize = "ledger.anchored")]
    LedgerAnchored,

    #[serde(rename = "payment.initiated")]
    #[strum(serialize = "payment.initiated")]
    PaymentInitiated,

    #[serde(rename = "payment.completed")]
    #[strum(serialize = "payment.completed")]
    PaymentCompleted,

    #[serde(rename = "payment.failed")]
    #[strum(serialize = "payment.failed")]
    PaymentFailed,
}

/// Who/what caused an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl EventMetadata {
    /// Metadata for a component, correlated to `correlation_id`
    pub fn from_source(source: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            correlation_id: correlation_id.into(),
            ..Default::default()
        }
    }
}

/// A domain event before it is written to the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    pub event_type: EventType,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl DomainEvent {
    /// Create an event with a fresh id, correlated to its aggregate
    pub fn new(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let aggregate_id = aggregate_id.into();
        Self {
            id: new_id(),
            event_type,
            metadata: EventMetadata::from_source("agentpay", aggregate_id.clone()),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            data,
            timestamp: Utc::now(),
            version: 1,
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
