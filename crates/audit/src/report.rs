//! Aggregated views over the audit trail

use crate::entry::{AuditEntry, AuditEventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_events: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_user: BTreeMap<String, usize>,
    pub by_resource: BTreeMap<String, usize>,
}

/// Entries bucketed for compliance review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_events: usize,
    pub security_events: Vec<AuditEntry>,
    pub payment_events: Vec<AuditEntry>,
    pub suspicious_activities: Vec<AuditEntry>,
    /// Critical-severity entries
    pub compliance_issues: Vec<AuditEntry>,
    pub generated_at: DateTime<Utc>,
}

/// Entries sharing event type, user, agent, resource and timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub event_type: AuditEventType,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub resource_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub count: usize,
}

/// Advisory self-check of the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditIntegrityReport {
    pub total_entries: usize,
    pub missing_timestamps: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub is_valid: bool,
    pub checked_at: DateTime<Utc>,
}
