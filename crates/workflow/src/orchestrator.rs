//! Payment orchestrator
//!
//! Drives a payment through rail selection, risk evaluation, consent
//! validation and execution. Every collaborator call is bounded by the
//! configured timeout; a timeout or error ends the workflow as `failed` with
//! the reason kept on the workflow. Completed payments are hashed and
//! appended to the payment chain once the store holds them as completed.

use crate::collaborators::{ConsentRequest, ConsentValidator, PaymentExecutor, RiskDecision, RiskEvaluator, RiskRequest};
use crate::config::WorkflowConfig;
use crate::error::{CollaboratorError, WorkflowError, WorkflowResult};
use crate::payment::{PaymentRequest, PaymentWorkflow, StepName, StepStatus, WorkflowStatus};
use crate::selector::RailSelector;
use crate::store::WorkflowStore;
use agentpay_audit::{AuditEventType, AuditTrail};
use agentpay_events::{DomainEvent, EventType, OutboxEvent, OutboxStore};
use agentpay_hashchain::{hash_payment, HashChain};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

const PAYMENT_BLOCK_KIND: &str = "payment";

/// Block payload for a completed payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBlock {
    pub kind: String,
    pub payment_id: String,
    pub agent_id: String,
    pub payment_hash: String,
    pub execution_reference: Option<String>,
}

/// The three external services a payment depends on
#[derive(Clone)]
pub struct Collaborators {
    pub risk: Arc<dyn RiskEvaluator>,
    pub consent: Arc<dyn ConsentValidator>,
    pub executor: Arc<dyn PaymentExecutor>,
}

#[derive(Clone)]
pub struct PaymentOrchestrator {
    collaborators: Collaborators,
    store: Arc<dyn WorkflowStore>,
    outbox: Arc<dyn OutboxStore>,
    audit: Arc<AuditTrail>,
    chain: Arc<HashChain>,
    selector: RailSelector,
    config: WorkflowConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn WorkflowStore>,
        outbox: Arc<dyn OutboxStore>,
        audit: Arc<AuditTrail>,
        chain: Arc<HashChain>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            collaborators,
            store,
            outbox,
            audit,
            chain,
            selector: RailSelector::default(),
            config,
        }
    }

    /// Restrict automatic selection to a different set of rails
    pub fn with_selector(mut self, selector: RailSelector) -> Self {
        self.selector = selector;
        self
    }

    /// The chain completed payments are appended to
    pub fn chain(&self) -> &Arc<HashChain> {
        &self.chain
    }

    /// Validate, pick a rail if none was named, and store a new payment as `pending`
    pub async fn initiate(&self, request: PaymentRequest) -> WorkflowResult<PaymentWorkflow> {
        request.validate()?;

        let rail = match request.rail {
            Some(rail) => rail,
            None => {
                let rail = self.selector.select(request.amount_usd, request.preferences.as_ref())?;
                tracing::info!(
                    agent_id = %request.agent_id,
                    amount_usd = %request.amount_usd,
                    %rail,
                    "Auto-selected rail"
                );
                rail
            }
        };

        let workflow = PaymentWorkflow::new(request, rail);
        self.store.insert(&workflow).await?;
        self.emit(EventType::PaymentInitiated, &workflow).await?;

        tracing::info!(
            payment_id = %workflow.id,
            agent_id = %workflow.agent_id,
            amount_usd = %workflow.amount_usd,
            rail = %workflow.rail,
            "Payment initiated"
        );
        self.audit_payment(
            AuditEventType::PaymentInitiated,
            &workflow,
            format!("Payment of {} USD to {} initiated", workflow.amount_usd, workflow.counterparty),
        )
        .await;

        Ok(workflow)
    }

    /// Move a pending payment to `processing` and run it on a detached task.
    ///
    /// The handle resolves to the terminal workflow; `get` can be polled instead.
    pub async fn start(&self, id: &str) -> WorkflowResult<JoinHandle<PaymentWorkflow>> {
        let workflow = self
            .store
            .transition(id, WorkflowStatus::Pending, WorkflowStatus::Processing)
            .await?;

        let this = self.clone();
        Ok(tokio::spawn(async move { this.run(workflow).await }))
    }

    pub async fn get(&self, id: &str) -> WorkflowResult<PaymentWorkflow> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkflowError::payment_not_found(id))
    }

    async fn run(&self, mut workflow: PaymentWorkflow) -> PaymentWorkflow {
        let outcome = match self.process(&mut workflow).await {
            Ok(()) => self.complete(&mut workflow).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            self.fail(&mut workflow, e).await;
        }
        workflow
    }

    /// Bound one collaborator call by the configured timeout
    async fn call<T, F>(&self, step: StepName, fut: F) -> WorkflowResult<T>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let timeout = self.config.collaborator_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(WorkflowError::Collaborator {
                step: step.to_string(),
                source,
            }),
            Err(_) => Err(WorkflowError::DownstreamTimeout {
                step: step.to_string(),
                timeout,
            }),
        }
    }

    async fn process(&self, workflow: &mut PaymentWorkflow) -> WorkflowResult<()> {
        // 1. Risk
        workflow.current_step = Some(StepName::RiskEvaluation);
        let request = RiskRequest::from(&*workflow);
        let assessment = self
            .call(StepName::RiskEvaluation, self.collaborators.risk.evaluate_risk(&request))
            .await?;
        workflow.risk_assessment = Some(assessment.clone());

        match assessment.decision {
            RiskDecision::Deny => return Err(WorkflowError::Denied(assessment.reason)),
            RiskDecision::Review => {
                tracing::warn!(
                    payment_id = %workflow.id,
                    score = %assessment.score,
                    reason = %assessment.reason,
                    "Payment flagged for review, continuing"
                );
                workflow.record_step(
                    StepName::RiskEvaluation,
                    StepStatus::Warning,
                    Some(format!("review: {}", assessment.reason)),
                );
            }
            RiskDecision::Approve => workflow.record_step(StepName::RiskEvaluation, StepStatus::Completed, None),
        }
        self.store.update(workflow).await?;

        // 2. Consent
        workflow.current_step = Some(StepName::ConsentValidation);
        let request = ConsentRequest::from(&*workflow);
        let consent = self
            .call(
                StepName::ConsentValidation,
                self.collaborators.consent.validate_consent(&request),
            )
            .await?;
        workflow.consent = Some(consent.clone());
        if !consent.valid {
            return Err(WorkflowError::ConsentRejected(
                consent.reason.unwrap_or_else(|| "consent not granted".to_string()),
            ));
        }
        workflow.record_step(StepName::ConsentValidation, StepStatus::Completed, consent.consent_id);
        self.store.update(workflow).await?;

        // 3. Execution
        workflow.current_step = Some(StepName::Execution);
        let receipt = self
            .call(StepName::Execution, self.collaborators.executor.execute(workflow))
            .await?;
        workflow.record_step(
            StepName::Execution,
            StepStatus::Completed,
            Some(receipt.reference_id.clone()),
        );
        workflow.execution_reference = Some(receipt.reference_id);
        self.store.update(workflow).await?;

        Ok(())
    }

    async fn complete(&self, workflow: &mut PaymentWorkflow) -> WorkflowResult<()> {
        workflow.current_step = Some(StepName::Completion);
        workflow.status = WorkflowStatus::Completed;

        let payment_hash = hash_payment(&workflow.hash_data());
        workflow.payment_hash = Some(payment_hash.clone());
        workflow.completed_at = Some(Utc::now());
        workflow.record_step(StepName::Completion, StepStatus::Completed, None);
        self.store.update(workflow).await?;

        // Only payments already stored as completed reach the chain
        let block = PaymentBlock {
            kind: PAYMENT_BLOCK_KIND.to_string(),
            payment_id: workflow.id.clone(),
            agent_id: workflow.agent_id.clone(),
            payment_hash,
            execution_reference: workflow.execution_reference.clone(),
        };
        let block = self.chain.clone().append(serde_json::to_string(&block)?).await?;
        workflow.block_index = Some(block.index);
        if let Err(e) = self.store.update(workflow).await {
            tracing::error!(
                payment_id = %workflow.id,
                block_index = block.index,
                error = %e,
                "Failed to record payment block index"
            );
        }

        tracing::info!(
            payment_id = %workflow.id,
            agent_id = %workflow.agent_id,
            block_index = block.index,
            "Payment completed"
        );

        if let Err(e) = self.emit(EventType::PaymentCompleted, workflow).await {
            tracing::error!(payment_id = %workflow.id, error = %e, "Failed to enqueue payment.completed");
        }
        self.audit_payment(
            AuditEventType::PaymentCompleted,
            workflow,
            format!("Payment to {} completed", workflow.counterparty),
        )
        .await;

        Ok(())
    }

    async fn fail(&self, workflow: &mut PaymentWorkflow, error: WorkflowError) {
        let reason = error.to_string();
        let step = workflow.current_step.unwrap_or(StepName::RiskEvaluation);

        workflow.status = WorkflowStatus::Failed;
        workflow.failure_reason = Some(reason.clone());
        workflow.payment_hash = None;
        workflow.block_index = None;
        workflow.record_step(step, StepStatus::Failed, Some(reason.clone()));

        tracing::warn!(payment_id = %workflow.id, step = %step, reason = %reason, "Payment failed");

        if let Err(e) = self.store.update(workflow).await {
            tracing::error!(payment_id = %workflow.id, error = %e, "Failed to persist failed payment");
        }
        if let Err(e) = self.emit(EventType::PaymentFailed, workflow).await {
            tracing::error!(payment_id = %workflow.id, error = %e, "Failed to enqueue payment.failed");
        }
        self.audit_payment(AuditEventType::PaymentFailed, workflow, format!("Payment failed: {}", reason))
            .await;
    }

    async fn emit(&self, event_type: EventType, workflow: &PaymentWorkflow) -> WorkflowResult<()> {
        let event = DomainEvent::new(
            event_type,
            &workflow.id,
            "payment",
            serde_json::json!({
                "payment_id": workflow.id,
                "agent_id": workflow.agent_id,
                "amount_usd": workflow.amount_usd,
                "counterparty": workflow.counterparty,
                "rail": workflow.rail,
                "fee_usd": workflow.fee_usd,
                "status": workflow.status,
                "failure_reason": workflow.failure_reason,
                "payment_hash": workflow.payment_hash,
            }),
        );
        self.outbox.enqueue(vec![OutboxEvent::from_event(&event)?]).await?;
        Ok(())
    }

    async fn audit_payment(&self, event_type: AuditEventType, workflow: &PaymentWorkflow, description: String) {
        let metadata = serde_json::json!({
            "amount_usd": workflow.amount_usd,
            "rail": workflow.rail,
            "fee_usd": workflow.fee_usd,
            "status": workflow.status,
            "failure_reason": workflow.failure_reason,
            "block_index": workflow.block_index,
        });
        if let Err(e) = self
            .audit
            .log_payment_event(event_type, &workflow.id, &workflow.agent_id, description, Some(metadata))
            .await
        {
            tracing::warn!(payment_id = %workflow.id, error = %e, "Failed to audit payment event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        ConsentResult, ExecutionReceipt, RiskAssessment, SandboxExecutor, ThresholdConsentValidator,
    };
    use crate::rail::Rail;
    use crate::selector::RailPreferences;
    use crate::store::InMemoryWorkflowStore;
    use agentpay_audit::{AuditQuery, InMemoryAuditStore};
    use agentpay_events::InMemoryOutboxStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct FixedRisk {
        decision: RiskDecision,
        delay: Duration,
    }

    #[async_trait]
    impl RiskEvaluator for FixedRisk {
        async fn evaluate_risk(&self, _request: &RiskRequest) -> Result<RiskAssessment, CollaboratorError> {
            tokio::time::sleep(self.delay).await;
            Ok(RiskAssessment {
                decision: self.decision,
                score: dec!(0.5),
                reason: format!("fixed {}", self.decision),
                risk_factors: vec![],
            })
        }
    }

    struct RejectingConsent;

    #[async_trait]
    impl ConsentValidator for RejectingConsent {
        async fn validate_consent(&self, _request: &ConsentRequest) -> Result<ConsentResult, CollaboratorError> {
            Ok(ConsentResult {
                valid: false,
                reason: Some("no active consent".to_string()),
                ..Default::default()
            })
        }
    }

    struct BrokenExecutor;

    #[async_trait]
    impl PaymentExecutor for BrokenExecutor {
        async fn execute(&self, _payment: &PaymentWorkflow) -> Result<ExecutionReceipt, CollaboratorError> {
            Err(CollaboratorError::new("bank unavailable"))
        }
    }

    /// Refuses to store a payment as completed
    struct NoCompletionStore(InMemoryWorkflowStore);

    #[async_trait]
    impl WorkflowStore for NoCompletionStore {
        async fn insert(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()> {
            self.0.insert(workflow).await
        }

        async fn get(&self, id: &str) -> WorkflowResult<Option<PaymentWorkflow>> {
            self.0.get(id).await
        }

        async fn update(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()> {
            if workflow.status == WorkflowStatus::Completed {
                return Err(WorkflowError::Validation("store offline".to_string()));
            }
            self.0.update(workflow).await
        }

        async fn transition(
            &self,
            id: &str,
            from: WorkflowStatus,
            to: WorkflowStatus,
        ) -> WorkflowResult<PaymentWorkflow> {
            self.0.transition(id, from, to).await
        }

        async fn list_by_agent(&self, agent_id: &str) -> WorkflowResult<Vec<PaymentWorkflow>> {
            self.0.list_by_agent(agent_id).await
        }
    }

    struct Harness {
        orchestrator: PaymentOrchestrator,
        outbox: Arc<InMemoryOutboxStore>,
        audit: Arc<AuditTrail>,
    }

    fn harness(collaborators: Collaborators, timeout_ms: u64) -> Harness {
        harness_with_store(collaborators, Arc::new(InMemoryWorkflowStore::new()), timeout_ms)
    }

    fn harness_with_store(collaborators: Collaborators, store: Arc<dyn WorkflowStore>, timeout_ms: u64) -> Harness {
        let outbox = Arc::new(InMemoryOutboxStore::new());
        let audit = Arc::new(AuditTrail::new(Arc::new(InMemoryAuditStore::new())));
        let orchestrator = PaymentOrchestrator::new(
            collaborators,
            store,
            outbox.clone(),
            audit.clone(),
            Arc::new(HashChain::new()),
            WorkflowConfig {
                collaborator_timeout_ms: timeout_ms,
            },
        );
        Harness {
            orchestrator,
            outbox,
            audit,
        }
    }

    fn collaborators(decision: RiskDecision) -> Collaborators {
        Collaborators {
            risk: Arc::new(FixedRisk {
                decision,
                delay: Duration::ZERO,
            }),
            consent: Arc::new(ThresholdConsentValidator::default()),
            executor: Arc::new(SandboxExecutor),
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest::new("agent-a", dec!(125.50), "Acme Corp")
            .rail(Rail::Ach)
            .description("Invoice 42")
    }

    async fn run(h: &Harness) -> PaymentWorkflow {
        let wf = h.orchestrator.initiate(request()).await.unwrap();
        let handle = h.orchestrator.start(&wf.id).await.unwrap();
        let finished = handle.await.unwrap();
        assert_eq!(h.orchestrator.get(&wf.id).await.unwrap(), finished);
        finished
    }

    async fn event_types(outbox: &InMemoryOutboxStore) -> Vec<String> {
        outbox.all().await.into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_approved_payment_completes_on_chain() {
        let h = harness(collaborators(RiskDecision::Approve), 1_000);
        let wf = run(&h).await;

        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.failure_reason.is_none());
        assert!(wf.execution_reference.as_deref().unwrap().starts_with("ach-"));
        let hash = wf.payment_hash.clone().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_payment(&wf.hash_data()));

        let chain = h.orchestrator.chain();
        assert!(chain.verify_chain());
        let block = chain.block_by_index(wf.block_index.unwrap()).unwrap();
        let payload: PaymentBlock = serde_json::from_str(&block.data).unwrap();
        assert_eq!(payload.payment_hash, hash);

        assert_eq!(event_types(&h.outbox).await, vec!["payment.initiated", "payment.completed"]);
        let trail = h
            .audit
            .query_audit_trail(AuditQuery::for_resource("payment", &wf.id))
            .await
            .unwrap();
        assert!(trail.iter().any(|e| e.event_type == AuditEventType::PaymentCompleted));
    }

    #[tokio::test]
    async fn test_denied_payment_fails() {
        let h = harness(collaborators(RiskDecision::Deny), 1_000);
        let wf = run(&h).await;

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert!(wf.failure_reason.as_deref().unwrap().contains("denied"));
        assert!(wf.payment_hash.is_none());
        assert_eq!(wf.step(StepName::RiskEvaluation).unwrap().status, StepStatus::Failed);
        assert!(wf.step(StepName::Execution).is_none());
        assert_eq!(h.orchestrator.chain().len(), 1);
        assert_eq!(event_types(&h.outbox).await, vec!["payment.initiated", "payment.failed"]);
    }

    #[tokio::test]
    async fn test_review_completes_with_warning_step() {
        let h = harness(collaborators(RiskDecision::Review), 1_000);
        let wf = run(&h).await;

        assert_eq!(wf.status, WorkflowStatus::Completed);
        let risk = wf.step(StepName::RiskEvaluation).unwrap();
        assert_eq!(risk.status, StepStatus::Warning);
        assert!(risk.message.as_deref().unwrap().starts_with("review"));
    }

    #[tokio::test]
    async fn test_slow_collaborator_times_out() {
        let mut c = collaborators(RiskDecision::Approve);
        c.risk = Arc::new(FixedRisk {
            decision: RiskDecision::Approve,
            delay: Duration::from_secs(5),
        });
        let h = harness(c, 50);
        let wf = run(&h).await;

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(
            wf.failure_reason.as_deref(),
            Some("risk_evaluation timed out after 50ms")
        );
    }

    #[tokio::test]
    async fn test_consent_rejection_and_executor_error() {
        let mut c = collaborators(RiskDecision::Approve);
        c.consent = Arc::new(RejectingConsent);
        let wf = run(&harness(c, 1_000)).await;
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.failure_reason.as_deref(), Some("Consent rejected: no active consent"));

        let mut c = collaborators(RiskDecision::Approve);
        c.executor = Arc::new(BrokenExecutor);
        let wf = run(&harness(c, 1_000)).await;
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.failure_reason.as_deref(), Some("execution failed: bank unavailable"));
        assert_eq!(wf.step(StepName::ConsentValidation).unwrap().status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_only_from_pending() {
        let h = harness(collaborators(RiskDecision::Approve), 1_000);
        let wf = h.orchestrator.initiate(request()).await.unwrap();
        h.orchestrator.start(&wf.id).await.unwrap().await.unwrap();

        assert!(matches!(
            h.orchestrator.start(&wf.id).await,
            Err(WorkflowError::InvalidState {
                actual: WorkflowStatus::Completed,
                ..
            })
        ));
        assert!(matches!(
            h.orchestrator.start("missing").await,
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_request_stores_nothing() {
        let h = harness(collaborators(RiskDecision::Approve), 1_000);
        let bad = PaymentRequest::new("agent-a", Decimal::ZERO, "Acme").rail(Rail::Card);
        assert!(matches!(
            h.orchestrator.initiate(bad).await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(h.outbox.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_unpersisted_completion_adds_no_block() {
        let store = Arc::new(NoCompletionStore(InMemoryWorkflowStore::new()));
        let h = harness_with_store(collaborators(RiskDecision::Approve), store, 1_000);
        let wf = run(&h).await;

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert!(wf.failure_reason.as_deref().unwrap().contains("store offline"));
        assert!(wf.block_index.is_none());
        assert_eq!(h.orchestrator.chain().len(), 1);
        assert_eq!(event_types(&h.outbox).await, vec!["payment.initiated", "payment.failed"]);
    }

    #[tokio::test]
    async fn test_rail_selected_when_not_named() {
        let h = harness(collaborators(RiskDecision::Approve), 1_000);

        let large = h
            .orchestrator
            .initiate(PaymentRequest::new("agent-a", dec!(50000), "Acme Corp"))
            .await
            .unwrap();
        assert_eq!(large.rail, Rail::Wire);
        assert_eq!(large.fee_usd, dec!(75));

        let small = PaymentRequest::new("agent-a", dec!(40), "Acme Corp")
            .preferences(RailPreferences::default().exclude(Rail::Ach));
        let small = h.orchestrator.initiate(small).await.unwrap();
        assert_eq!(small.rail, Rail::Card);
        assert_eq!(small.fee_usd, dec!(1.46));

        let finished = h.orchestrator.start(&small.id).await.unwrap().await.unwrap();
        assert_eq!(finished.status, WorkflowStatus::Completed);
        assert!(finished.execution_reference.as_deref().unwrap().starts_with("card-"));

        let too_large = PaymentRequest::new("agent-a", dec!(20000000), "Acme Corp");
        assert!(matches!(
            h.orchestrator.initiate(too_large).await,
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(h.outbox.all().await.len(), 3);
    }
}
