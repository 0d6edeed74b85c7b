//! Workflow configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on every single risk, consent or execution call
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
}

fn default_collaborator_timeout_ms() -> u64 {
    30_000
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_thirty_seconds() {
        let config: WorkflowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.collaborator_timeout(), Duration::from_secs(30));
    }
}
