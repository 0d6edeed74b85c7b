//! Outbox relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the outbox relay sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Rows fetched per sweep
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Failed rows stop being retried once retry_count reaches this
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between sweeps when running continuously
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
