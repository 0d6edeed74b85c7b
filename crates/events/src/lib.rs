//! AgentPay Events - transactional outbox
//!
//! Domain events are written as outbox rows in the same unit of work as the
//! mutation that caused them. A relay sweeps publishable rows to an
//! `EventPublisher` afterwards.
//!
//! Delivery is at-least-once: a row whose publish succeeded but whose
//! `mark_published` failed is sent again. Consumers must be idempotent.

pub mod config;
pub mod error;
pub mod event;
pub mod outbox;
pub mod publisher;
pub mod relay;

pub use config::OutboxConfig;
pub use error::{EventError, PublishError};
pub use event::{DomainEvent, EventMetadata, EventType};
pub use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStatus, OutboxStore};
pub use publisher::{BroadcastPublisher, EventPublisher, LoggingPublisher};
pub use relay::{OutboxRelay, RelayReport};
