//! Risk, consent and execution collaborators
//!
//! The orchestrator only sees the traits. The rule-based implementations
//! below back the CLI sandbox and tests.

use crate::error::CollaboratorError;
use crate::payment::PaymentWorkflow;
use crate::rail::Rail;
use agentpay_core::new_id;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub agent_id: String,
    pub amount_usd: Decimal,
    pub counterparty: String,
    pub rail: Rail,
}

impl From<&PaymentWorkflow> for RiskRequest {
    fn from(wf: &PaymentWorkflow) -> Self {
        Self {
            agent_id: wf.agent_id.clone(),
            amount_usd: wf.amount_usd,
            counterparty: wf.counterparty.clone(),
            rail: wf.rail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RiskDecision {
    Approve,
    Deny,
    Review,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub decision: RiskDecision,
    /// 0 (safe) to 1 (riskiest)
    pub score: Decimal,
    pub reason: String,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub agent_id: String,
    pub owner_party_id: String,
    pub amount_usd: Decimal,
    pub counterparty: String,
    pub rail: Rail,
}

impl From<&PaymentWorkflow> for ConsentRequest {
    fn from(wf: &PaymentWorkflow) -> Self {
        Self {
            agent_id: wf.agent_id.clone(),
            owner_party_id: wf.owner_party_id.clone(),
            amount_usd: wf.amount_usd,
            counterparty: wf.counterparty.clone(),
            rail: wf.rail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsentResult {
    pub valid: bool,
    pub consent_id: Option<String>,
    pub reason: Option<String>,
    pub requires_approval: Option<bool>,
    pub approver_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub reference_id: String,
}

#[async_trait]
pub trait RiskEvaluator: Send + Sync {
    async fn evaluate_risk(&self, request: &RiskRequest) -> Result<RiskAssessment, CollaboratorError>;
}

#[async_trait]
pub trait ConsentValidator: Send + Sync {
    async fn validate_consent(&self, request: &ConsentRequest) -> Result<ConsentResult, CollaboratorError>;
}

#[async_trait]
pub trait PaymentExecutor: Send + Sync {
    async fn execute(&self, payment: &PaymentWorkflow) -> Result<ExecutionReceipt, CollaboratorError>;
}

/// Additive score over amount, counterparty and rail.
///
/// `score >= threshold` denies, `score >= 0.8 * threshold` asks for review.
#[derive(Debug, Clone)]
pub struct RuleBasedRiskEvaluator {
    pub threshold: Decimal,
}

impl Default for RuleBasedRiskEvaluator {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(7, 1),
        }
    }
}

impl RuleBasedRiskEvaluator {
    pub fn assess(&self, request: &RiskRequest) -> RiskAssessment {
        let mut score = Decimal::ZERO;
        let mut factors = Vec::new();
        let mut add = |points: i64, factor: &str| {
            score += Decimal::new(points, 2);
            factors.push(factor.to_string());
        };

        if request.amount_usd > Decimal::new(25_000, 0) {
            add(40, "very_high_amount");
        } else if request.amount_usd > Decimal::new(10_000, 0) {
            add(30, "high_amount");
        } else if request.amount_usd > Decimal::new(1_000, 0) {
            add(15, "medium_amount");
        }

        let counterparty = request.counterparty.to_lowercase();
        if counterparty.contains("suspicious") || counterparty.contains("unknown") || counterparty.chars().count() < 3 {
            add(25, "suspicious_counterparty");
        } else if counterparty.contains("new") || counterparty.contains("unverified") {
            add(10, "unverified_counterparty");
        }

        match request.rail {
            Rail::Wire => add(20, "wire_transfer"),
            Rail::Card => add(5, "card_payment"),
            Rail::Ach | Rail::Check => {}
        }

        let score = score.min(Decimal::ONE);
        let (decision, reason) = if score >= self.threshold {
            (RiskDecision::Deny, "risk score exceeds threshold")
        } else if score >= self.threshold * Decimal::new(8, 1) {
            (RiskDecision::Review, "requires manual review")
        } else {
            (RiskDecision::Approve, "low risk")
        };

        RiskAssessment {
            decision,
            score,
            reason: reason.to_string(),
            risk_factors: factors,
        }
    }
}

#[async_trait]
impl RiskEvaluator for RuleBasedRiskEvaluator {
    async fn evaluate_risk(&self, request: &RiskRequest) -> Result<RiskAssessment, CollaboratorError> {
        Ok(self.assess(request))
    }
}

/// Grants consent, flagging amounts above `approval_threshold` for co-signing
#[derive(Debug, Clone)]
pub struct ThresholdConsentValidator {
    pub approval_threshold: Decimal,
    pub approver_group: String,
}

impl Default for ThresholdConsentValidator {
    fn default() -> Self {
        Self {
            approval_threshold: Decimal::new(10_000, 0),
            approver_group: "senior_approvers".to_string(),
        }
    }
}

#[async_trait]
impl ConsentValidator for ThresholdConsentValidator {
    async fn validate_consent(&self, request: &ConsentRequest) -> Result<ConsentResult, CollaboratorError> {
        let requires_approval = request.amount_usd > self.approval_threshold;
        Ok(ConsentResult {
            valid: true,
            consent_id: Some(format!("consent-{}", request.owner_party_id)),
            reason: None,
            requires_approval: Some(requires_approval),
            approver_group: requires_approval.then(|| self.approver_group.clone()),
        })
    }
}

/// Executor that settles nothing and hands back a fresh reference
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor;

#[async_trait]
impl PaymentExecutor for SandboxExecutor {
    async fn execute(&self, payment: &PaymentWorkflow) -> Result<ExecutionReceipt, CollaboratorError> {
        tracing::debug!(payment_id = %payment.id, rail = %payment.rail, "Sandbox execution");
        Ok(ExecutionReceipt {
            reference_id: format!("{}-{}", payment.rail, new_id()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, counterparty: &str, rail: Rail) -> RiskRequest {
        RiskRequest {
            agent_id: "agent-a".to_string(),
            amount_usd: amount,
            counterparty: counterparty.to_string(),
            rail,
        }
    }

    #[test]
    fn test_low_risk_is_approved() {
        let assessment = RuleBasedRiskEvaluator::default().assess(&request(dec!(50), "Acme Corp", Rail::Ach));
        assert_eq!(assessment.decision, RiskDecision::Approve);
        assert_eq!(assessment.score, Decimal::ZERO);
        assert!(assessment.risk_factors.is_empty());
    }

    #[test]
    fn test_review_band() {
        // 0.40 + 0.20 = 0.60, inside [0.56, 0.70)
        let assessment = RuleBasedRiskEvaluator::default().assess(&request(dec!(30000), "Acme Corp", Rail::Wire));
        assert_eq!(assessment.decision, RiskDecision::Review);
        assert_eq!(assessment.score, dec!(0.60));
    }

    #[test]
    fn test_deny_above_threshold() {
        let assessment =
            RuleBasedRiskEvaluator::default().assess(&request(dec!(30000), "unknown vendor", Rail::Wire));
        assert_eq!(assessment.decision, RiskDecision::Deny);
        assert_eq!(assessment.score, dec!(0.85));
        assert_eq!(
            assessment.risk_factors,
            vec!["very_high_amount", "suspicious_counterparty", "wire_transfer"]
        );
    }

    #[tokio::test]
    async fn test_consent_flags_large_amounts() {
        let validator = ThresholdConsentValidator::default();
        let consent = |amount| ConsentRequest {
            agent_id: "agent-a".to_string(),
            owner_party_id: "org-1".to_string(),
            amount_usd: amount,
            counterparty: "Acme".to_string(),
            rail: Rail::Wire,
        };

        let small = validator.validate_consent(&consent(dec!(100))).await.unwrap();
        assert!(small.valid);
        assert_eq!(small.requires_approval, Some(false));
        assert!(small.approver_group.is_none());

        let large = validator.validate_consent(&consent(dec!(50000))).await.unwrap();
        assert_eq!(large.approver_group.as_deref(), Some("senior_approvers"));
    }
}
