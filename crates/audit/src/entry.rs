//! Audit entry and its classification enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// What happened. Rendered as a dotted code (`transaction.posted`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum AuditEventType {
    // Authentication
    #[strum(serialize = "auth.login.success")]
    LoginSuccess,
    #[strum(serialize = "auth.login.failed")]
    LoginFailed,
    #[strum(serialize = "auth.logout")]
    Logout,
    #[strum(serialize = "auth.permission.grant")]
    PermissionGrant,
    #[strum(serialize = "auth.permission.revoke")]
    PermissionRevoke,

    // Payments
    #[strum(serialize = "payment.initiated")]
    PaymentInitiated,
    #[strum(serialize = "payment.risk_checked")]
    PaymentRiskChecked,
    #[strum(serialize = "payment.authorized")]
    PaymentAuthorized,
    #[strum(serialize = "payment.executed")]
    PaymentExecuted,
    #[strum(serialize = "payment.completed")]
    PaymentCompleted,
    #[strum(serialize = "payment.failed")]
    PaymentFailed,
    #[strum(serialize = "payment.cancelled")]
    PaymentCancelled,

    // Accounts
    #[strum(serialize = "account.created")]
    AccountCreated,
    #[strum(serialize = "account.updated")]
    AccountUpdated,
    #[strum(serialize = "account.deleted")]
    AccountDeleted,
    #[strum(serialize = "account.balance_changed")]
    BalanceChanged,
    #[strum(serialize = "account.reconciled")]
    AccountReconciled,

    // Transactions
    #[strum(serialize = "transaction.posted")]
    TransactionPosted,
    #[strum(serialize = "transaction.voided")]
    TransactionVoided,

    // Ledger integrity
    #[strum(serialize = "ledger.anchored")]
    LedgerAnchored,

    // System
    #[strum(serialize = "system.config.changed")]
    ConfigChanged,
    #[strum(serialize = "system.data.export")]
    DataExport,
    #[strum(serialize = "system.security.alert")]
    SecurityAlert,
}

impl AuditEventType {
    /// Trailing segment of the code, used as the default action
    pub fn action(&self) -> String {
        let code = self.to_string();
        code.rsplit('.').next().unwrap_or_default().to_string()
    }
}

impl TryFrom<String> for AuditEventType {
    type Error = strum::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        AuditEventType::from_str(&s)
    }
}

impl From<AuditEventType> for String {
    fn from(t: AuditEventType) -> Self {
        t.to_string()
    }
}

/// How much attention an entry deserves
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditSeverity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Immutable record of a domain mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Empty until logged
    pub id: String,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub action: String,
    pub description: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    /// Assigned at logging time if absent
    pub timestamp: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl AuditEntry {
    /// New entry with the event type's default action and low severity
    pub fn new(event_type: AuditEventType, description: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            event_type,
            severity: AuditSeverity::Low,
            user_id: None,
            agent_id: None,
            resource_id: None,
            resource_type: None,
            action: event_type.action(),
            description: description.into(),
            old_values: None,
            new_values: None,
            metadata: None,
            ip_address: None,
            user_agent: None,
            session_id: None,
            correlation_id: None,
            timestamp: None,
            archived: false,
        }
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Before/after snapshots
    pub fn changes(mut self, old: Option<serde_json::Value>, new: Option<serde_json::Value>) -> Self {
        self.old_values = old;
        self.new_values = new;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_codes_round_trip() {
        assert_eq!(AuditEventType::TransactionPosted.to_string(), "transaction.posted");
        assert_eq!(
            "system.security.alert".parse::<AuditEventType>().unwrap(),
            AuditEventType::SecurityAlert
        );
        assert!("nope.nothing".parse::<AuditEventType>().is_err());

        let json = serde_json::to_string(&AuditEventType::LoginFailed).unwrap();
        assert_eq!(json, "\"auth.login.failed\"");
    }

    #[test]
    fn test_default_action_is_last_segment() {
        assert_eq!(AuditEventType::TransactionPosted.action(), "posted");
        assert_eq!(AuditEventType::LoginFailed.action(), "failed");
        assert_eq!(AuditEntry::new(AuditEventType::Logout, "bye").action, "logout");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Critical > AuditSeverity::High);
        assert!(AuditSeverity::Medium.max(AuditSeverity::High) == AuditSeverity::High);
        assert_eq!(AuditSeverity::High.to_string(), "high");
        assert_eq!("critical".parse::<AuditSeverity>().unwrap(), AuditSeverity::Critical);
    }

    #[test]
    fn test_builder() {
        let entry = AuditEntry::new(AuditEventType::AccountCreated, "Created Cash")
            .agent("agent-a")
            .resource("account", "acct-1")
            .severity(AuditSeverity::Medium)
            .ip("10.0.0.1");

        assert!(entry.id.is_empty());
        assert!(entry.timestamp.is_none());
        assert_eq!(entry.resource_id.as_deref(), Some("acct-1"));
        assert_eq!(entry.severity, AuditSeverity::Medium);
        assert!(!entry.archived);
    }
}
