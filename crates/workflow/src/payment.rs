//! Payment workflow state

use crate::collaborators::{ConsentResult, RiskAssessment};
use crate::error::{WorkflowError, WorkflowResult};
use crate::rail::Rail;
use crate::selector::RailPreferences;
use agentpay_core::{exceeds_money_scale, new_id};
use agentpay_hashchain::PaymentHashData;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle: pending -> processing -> completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    RiskEvaluation,
    ConsentValidation,
    Execution,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    /// Passed, but flagged for a human
    Warning,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: StepName,
    pub status: StepStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Request to move money to a counterparty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub agent_id: String,
    /// Party on whose behalf the agent pays; consent is checked against it
    pub owner_party_id: String,
    pub amount_usd: Decimal,
    pub counterparty: String,
    /// Selected from `preferences` when absent
    #[serde(default)]
    pub rail: Option<Rail>,
    #[serde(default)]
    pub preferences: Option<RailPreferences>,
    pub description: String,
}

impl PaymentRequest {
    pub fn new(agent_id: impl Into<String>, amount_usd: Decimal, counterparty: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        Self {
            owner_party_id: agent_id.clone(),
            agent_id,
            amount_usd,
            counterparty: counterparty.into(),
            rail: None,
            preferences: None,
            description: String::new(),
        }
    }

    pub fn rail(mut self, rail: Rail) -> Self {
        self.rail = Some(rail);
        self
    }

    pub fn preferences(mut self, preferences: RailPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn owner(mut self, owner_party_id: impl Into<String>) -> Self {
        self.owner_party_id = owner_party_id.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reject the request before anything is stored
    pub fn validate(&self) -> WorkflowResult<()> {
        let mut problems = Vec::new();

        if self.agent_id.trim().is_empty() {
            problems.push("agent_id is required".to_string());
        }
        if self.counterparty.trim().is_empty() {
            problems.push("counterparty is required".to_string());
        }
        if self.amount_usd <= Decimal::ZERO {
            problems.push("amount_usd must be positive".to_string());
        } else if exceeds_money_scale(self.amount_usd) {
            problems.push("amount_usd must have at most 2 decimal places".to_string());
        } else if let Some(rail) = self.rail.filter(|r| !r.accepts(self.amount_usd)) {
            problems.push(format!(
                "amount_usd {} outside {} limits [{}, {}]",
                self.amount_usd,
                rail,
                rail.min_amount(),
                rail.max_amount()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(problems.join("; ")))
        }
    }
}

/// One payment moving through risk, consent and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentWorkflow {
    pub id: String,
    pub agent_id: String,
    pub owner_party_id: String,
    pub amount_usd: Decimal,
    pub counterparty: String,
    pub rail: Rail,
    /// Rail fee quoted at initiation
    pub fee_usd: Decimal,
    pub description: String,
    pub status: WorkflowStatus,
    pub current_step: Option<StepName>,
    pub steps: Vec<WorkflowStep>,
    pub risk_assessment: Option<RiskAssessment>,
    pub consent: Option<ConsentResult>,
    pub execution_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub payment_hash: Option<String>,
    pub block_index: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentWorkflow {
    /// A pending workflow for `request`, settling over `rail`
    pub fn new(request: PaymentRequest, rail: Rail) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            agent_id: request.agent_id,
            owner_party_id: request.owner_party_id,
            fee_usd: rail.fee(request.amount_usd),
            amount_usd: request.amount_usd,
            counterparty: request.counterparty,
            rail,
            description: request.description,
            status: WorkflowStatus::Pending,
            current_step: None,
            steps: Vec::new(),
            risk_assessment: None,
            consent: None,
            execution_reference: None,
            failure_reason: None,
            payment_hash: None,
            block_index: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub(crate) fn record_step(&mut self, name: StepName, status: StepStatus, message: Option<String>) {
        let now = Utc::now();
        self.steps.push(WorkflowStep {
            name,
            status,
            message,
            timestamp: now,
        });
        self.updated_at = now;
    }

    pub fn step(&self, name: StepName) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Canonical hash input for the completed payment
    pub fn hash_data(&self) -> PaymentHashData {
        PaymentHashData {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            amount: self.amount_usd,
            counterparty: self.counterparty.clone(),
            rail: self.rail.to_string(),
            description: self.description.clone(),
            timestamp: self.created_at,
            status: self.status.to_string(),
        }
    }
}
