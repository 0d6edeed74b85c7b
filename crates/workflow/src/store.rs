//! Workflow persistence

use crate::error::{WorkflowError, WorkflowResult};
use crate::payment::{PaymentWorkflow, WorkflowStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()>;

    async fn get(&self, id: &str) -> WorkflowResult<Option<PaymentWorkflow>>;

    /// Replace a stored workflow
    async fn update(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()>;

    /// Atomically move `id` from `from` to `to`, returning the updated workflow
    async fn transition(&self, id: &str, from: WorkflowStatus, to: WorkflowStatus) -> WorkflowResult<PaymentWorkflow>;

    async fn list_by_agent(&self, agent_id: &str) -> WorkflowResult<Vec<PaymentWorkflow>>;
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, PaymentWorkflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()> {
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> WorkflowResult<Option<PaymentWorkflow>> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn update(&self, workflow: &PaymentWorkflow) -> WorkflowResult<()> {
        let mut workflows = self.workflows.write().await;
        match workflows.get_mut(&workflow.id) {
            Some(stored) => {
                *stored = workflow.clone();
                Ok(())
            }
            None => Err(WorkflowError::payment_not_found(&workflow.id)),
        }
    }

    async fn transition(&self, id: &str, from: WorkflowStatus, to: WorkflowStatus) -> WorkflowResult<PaymentWorkflow> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| WorkflowError::payment_not_found(id))?;

        if workflow.status != from {
            return Err(WorkflowError::InvalidState {
                id: id.to_string(),
                expected: from,
                actual: workflow.status,
            });
        }

        workflow.status = to;
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    async fn list_by_agent(&self, agent_id: &str) -> WorkflowResult<Vec<PaymentWorkflow>> {
        let mut list: Vec<PaymentWorkflow> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.agent_id == agent_id)
            .cloned()
            .collect();
        list.sort_by_key(|w| w.created_at);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentRequest;
    use crate::rail::Rail;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_transition_checks_current_status() {
        let store = InMemoryWorkflowStore::new();
        let wf = PaymentWorkflow::new(PaymentRequest::new("agent-a", dec!(10), "acme"), Rail::Ach);
        store.insert(&wf).await.unwrap();

        let moved = store
            .transition(&wf.id, WorkflowStatus::Pending, WorkflowStatus::Processing)
            .await
            .unwrap();
        assert_eq!(moved.status, WorkflowStatus::Processing);

        let again = store
            .transition(&wf.id, WorkflowStatus::Pending, WorkflowStatus::Processing)
            .await;
        assert!(matches!(
            again,
            Err(WorkflowError::InvalidState {
                actual: WorkflowStatus::Processing,
                ..
            })
        ));

        assert!(matches!(
            store.transition("nope", WorkflowStatus::Pending, WorkflowStatus::Processing).await,
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = InMemoryWorkflowStore::new();
        let wf = PaymentWorkflow::new(PaymentRequest::new("agent-a", dec!(10), "acme"), Rail::Ach);
        assert!(store.update(&wf).await.is_err());
        store.insert(&wf).await.unwrap();
        assert_eq!(store.list_by_agent("agent-a").await.unwrap().len(), 1);
    }
}
