//! Platform configuration

use agentpay_balances::BalanceConfig;
use agentpay_events::OutboxConfig;
use agentpay_workflow::WorkflowConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATABASE_URL: &str = "AGENTPAY_DATABASE_URL";
pub const ENV_DATA_DIR: &str = "AGENTPAY_DATA_DIR";
pub const ENV_COLLABORATOR_TIMEOUT_MS: &str = "AGENTPAY_COLLABORATOR_TIMEOUT_MS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// SQLite URL; defaults to `agentpay.db` inside `data_dir`
    #[serde(default)]
    pub database_url: Option<String>,

    /// Holds the database and the block journals
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub balances: BalanceConfig,

    #[serde(default)]
    pub outbox: OutboxConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            balances: BalanceConfig::default(),
            outbox: OutboxConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl PlatformConfig {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Defaults overridden from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `AGENTPAY_*` overrides looked up through `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup(ENV_COLLABORATOR_TIMEOUT_MS) {
            self.workflow.collaborator_timeout_ms = ms
                .parse()
                .with_context(|| format!("{} must be milliseconds, got {:?}", ENV_COLLABORATOR_TIMEOUT_MS, ms))?;
        }
        Ok(self)
    }

    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}", self.data_dir.join("agentpay.db").display()),
        }
    }

    pub fn anchor_journal_path(&self) -> PathBuf {
        self.data_dir.join("anchors.jsonl")
    }

    pub fn payment_journal_path(&self) -> PathBuf {
        self.data_dir.join("payments.jsonl")
    }
}
