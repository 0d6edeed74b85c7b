//! Application context - wires everything together

use crate::config::PlatformConfig;
use agentpay_audit::{AuditStore, AuditTrail, InMemoryAuditStore, SqliteAuditStore};
use agentpay_balances::{BalanceCalculator, NoOutstandingItems, OutstandingItemSource};
use agentpay_events::{EventPublisher, OutboxRelay, OutboxStore};
use agentpay_hashchain::HashChain;
use agentpay_ledger::{AgentLocks, Anchorer, InMemoryLedgerStore, PostingEngine, SharedLedgerStore, SqliteLedgerStore};
use agentpay_workflow::{
    Collaborators, InMemoryWorkflowStore, PaymentOrchestrator, RuleBasedRiskEvaluator, SandboxExecutor,
    ThresholdConsentValidator,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

/// Every component of the platform, constructed once and shared
pub struct AppContext {
    pub config: PlatformConfig,
    pub ledger: SharedLedgerStore,
    pub outbox: Arc<dyn OutboxStore>,
    pub audit: Arc<AuditTrail>,
    pub engine: PostingEngine,
    pub balances: BalanceCalculator,
    pub anchorer: Anchorer,
    pub payments: PaymentOrchestrator,
    sqlite: Option<SqliteLedgerStore>,
}

/// Storage behind a context, before the services are layered on top
struct Backend {
    ledger: SharedLedgerStore,
    outbox: Arc<dyn OutboxStore>,
    audit: Arc<dyn AuditStore>,
    anchor_chain: HashChain,
    payment_chain: HashChain,
    sqlite: Option<SqliteLedgerStore>,
}

impl AppContext {
    /// Durable context: SQLite for rows, JSONL journals for the block chains
    pub async fn new(config: PlatformConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let options = SqliteConnectOptions::from_str(&config.database_url())?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        let ledger = SqliteLedgerStore::new(pool.clone());
        ledger.init().await?;
        let audit = SqliteAuditStore::new(pool);
        audit.init().await?;

        tracing::info!(
            database = %config.database_url(),
            data_dir = %config.data_dir.display(),
            "Opened durable backend"
        );

        let backend = Backend {
            ledger: Arc::new(ledger.clone()),
            outbox: Arc::new(ledger.clone()),
            audit: Arc::new(audit),
            anchor_chain: HashChain::with_journal(config.anchor_journal_path())?,
            payment_chain: HashChain::with_journal(config.payment_journal_path())?,
            sqlite: Some(ledger),
        };
        Ok(Self::assemble(config, backend, Arc::new(NoOutstandingItems)))
    }

    /// Volatile context for tests and dry runs
    pub fn in_memory(config: PlatformConfig) -> Self {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let backend = Backend {
            ledger: ledger.clone(),
            outbox: ledger,
            audit: Arc::new(InMemoryAuditStore::new()),
            anchor_chain: HashChain::new(),
            payment_chain: HashChain::new(),
            sqlite: None,
        };
        Self::assemble(config, backend, Arc::new(NoOutstandingItems))
    }

    fn assemble(config: PlatformConfig, backend: Backend, outstanding: Arc<dyn OutstandingItemSource>) -> Self {
        let audit = Arc::new(AuditTrail::new(backend.audit));
        let locks = Arc::new(AgentLocks::new());

        let engine = PostingEngine::new(backend.ledger.clone(), audit.clone(), locks);
        let balances = BalanceCalculator::new(backend.ledger.clone(), outstanding, config.balances.clone());
        let anchorer = Anchorer::new(backend.ledger.clone(), Arc::new(backend.anchor_chain), audit.clone());

        let collaborators = Collaborators {
            risk: Arc::new(RuleBasedRiskEvaluator::default()),
            consent: Arc::new(ThresholdConsentValidator::default()),
            executor: Arc::new(SandboxExecutor),
        };
        let payments = PaymentOrchestrator::new(
            collaborators,
            Arc::new(InMemoryWorkflowStore::new()),
            backend.outbox.clone(),
            audit.clone(),
            Arc::new(backend.payment_chain),
            config.workflow.clone(),
        );

        Self {
            config,
            ledger: backend.ledger,
            outbox: backend.outbox,
            audit,
            engine,
            balances,
            anchorer,
            payments,
            sqlite: backend.sqlite,
        }
    }

    /// Swap the payment collaborators, keeping every store
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.payments = PaymentOrchestrator::new(
            collaborators,
            Arc::new(InMemoryWorkflowStore::new()),
            self.outbox.clone(),
            self.audit.clone(),
            self.payments.chain().clone(),
            self.config.workflow.clone(),
        );
        self
    }

    /// The SQLite ledger store, when the context is durable
    pub fn sqlite(&self) -> Option<&SqliteLedgerStore> {
        self.sqlite.as_ref()
    }

    /// Relay over this context's outbox
    pub fn relay(&self, publisher: Arc<dyn EventPublisher>) -> OutboxRelay {
        OutboxRelay::new(self.outbox.clone(), publisher, self.config.outbox.clone())
    }
}
