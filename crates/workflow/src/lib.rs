//! AgentPay Workflow - payment orchestration
//!
//! # Flow
//! 1. `initiate` validates a `PaymentRequest`, selects a rail when none is named and stores it as pending
//! 2. `start` flips it to processing and runs risk, consent and execution on a detached task
//! 3. `get` polls until the workflow is completed or failed
//!
//! Completed payments are hashed and appended to a dedicated `HashChain`.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payment;
pub mod rail;
pub mod selector;
pub mod store;

pub use collaborators::{
    ConsentRequest, ConsentResult, ConsentValidator, ExecutionReceipt, PaymentExecutor, RiskAssessment,
    RiskDecision, RiskEvaluator, RiskRequest, RuleBasedRiskEvaluator, SandboxExecutor, ThresholdConsentValidator,
};
pub use config::WorkflowConfig;
pub use error::{CollaboratorError, WorkflowError, WorkflowResult};
pub use orchestrator::{Collaborators, PaymentBlock, PaymentOrchestrator};
pub use payment::{PaymentRequest, PaymentWorkflow, StepName, StepStatus, WorkflowStatus, WorkflowStep};
pub use rail::{FeeSchedule, Rail};
pub use selector::{RailPreferences, RailSelector, SelectionPriority};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
