//! Publishing capability consumed by the relay

use crate::error::PublishError;
use crate::outbox::OutboxEvent;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Hands an outbox row to a broker.
///
/// The relay may deliver the same row more than once.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publisher name (for logging)
    fn name(&self) -> &str;

    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Publishing with no live subscriber fails, leaving the row for a later sweep.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<OutboxEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboxEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers(event.id.clone()))
    }
}

/// Writes every event to the tracing log
#[derive(Debug, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl EventPublisher for LoggingPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Published event"
        );
        Ok(())
    }
}
