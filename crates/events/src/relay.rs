//! Outbox relay - sweeps publishable rows to a publisher

use crate::config::OutboxConfig;
use crate::error::EventError;
use crate::outbox::OutboxStore;
use crate::publisher::EventPublisher;
use std::sync::Arc;
use tokio::sync::watch;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
}

/// Moves outbox rows to the publisher, at least once
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Publish one batch.
    ///
    /// A publish failure is recorded on the row and counted, not returned.
    /// Only storage failures abort the sweep.
    pub async fn run_once(&self) -> Result<RelayReport, EventError> {
        let batch = self
            .store
            .fetch_publishable(self.config.batch_size, self.config.max_retries)
            .await?;

        let mut report = RelayReport::default();

        for event in batch {
            match self.publisher.publish(&event).await {
                Ok(()) => {
                    self.store.mark_published(&event.id).await?;
                    report.published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        publisher = self.publisher.name(),
                        event_id = %event.id,
                        retry_count = event.retry_count + 1,
                        "Publish failed: {}",
                        e
                    );
                    self.store.mark_failed(&event.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        if report.published + report.failed > 0 {
            tracing::debug!(
                published = report.published,
                failed = report.failed,
                "Outbox sweep complete"
            );
        }

        Ok(report)
    }

    /// Sweep every `poll_interval` until `shutdown` flips to true or closes
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(publisher = self.publisher.name(), "Outbox sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Outbox relay stopping");
                        break;
                    }
                }
            }
        }
    }
}
