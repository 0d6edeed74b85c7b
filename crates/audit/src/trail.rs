//! Audit trail service - logging helpers, queries and reports

use crate::entry::{AuditEntry, AuditEventType, AuditSeverity};
use crate::error::AuditResult;
use crate::query::{AuditQuery, DEFAULT_QUERY_LIMIT};
use crate::report::{AuditIntegrityReport, AuditSummary, ComplianceReport, DuplicateGroup};
use crate::store::AuditStore;
use agentpay_core::new_id;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Front door for writing and reading audit entries
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Persist an entry, assigning an id and timestamp when absent
    pub async fn log_event(&self, mut entry: AuditEntry) -> AuditResult<AuditEntry> {
        if entry.id.is_empty() {
            entry.id = new_id();
        }
        if entry.timestamp.is_none() {
            entry.timestamp = Some(Utc::now());
        }

        self.store.insert(&entry).await?;

        tracing::debug!(
            audit_id = %entry.id,
            event_type = %entry.event_type,
            severity = %entry.severity,
            "Audit entry logged"
        );
        Ok(entry)
    }

    /// Payment lifecycle entry; failures are high severity
    pub async fn log_payment_event(
        &self,
        event_type: AuditEventType,
        payment_id: &str,
        agent_id: &str,
        description: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> AuditResult<AuditEntry> {
        let severity = match event_type {
            AuditEventType::PaymentFailed => AuditSeverity::High,
            _ => AuditSeverity::Medium,
        };

        let mut entry = AuditEntry::new(event_type, description)
            .agent(agent_id)
            .resource("payment", payment_id)
            .severity(severity)
            .correlation(payment_id);
        entry.metadata = metadata;

        self.log_event(entry).await
    }

    /// Account lifecycle entry with before/after snapshots
    pub async fn log_account_event(
        &self,
        event_type: AuditEventType,
        account_id: &str,
        agent_id: &str,
        description: impl Into<String>,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> AuditResult<AuditEntry> {
        let entry = AuditEntry::new(event_type, description)
            .agent(agent_id)
            .resource("account", account_id)
            .changes(old_values, new_values);

        self.log_event(entry).await
    }

    /// Ledger transaction entry
    pub async fn log_transaction_event(
        &self,
        event_type: AuditEventType,
        transaction_id: &str,
        agent_id: &str,
        description: impl Into<String>,
        new_values: Option<serde_json::Value>,
    ) -> AuditResult<AuditEntry> {
        let entry = AuditEntry::new(event_type, description)
            .agent(agent_id)
            .resource("transaction", transaction_id)
            .severity(AuditSeverity::Medium)
            .changes(None, new_values)
            .correlation(transaction_id);

        self.log_event(entry).await
    }

    /// Security entry. Failed logins and security alerts are at least high.
    pub async fn log_security_event(
        &self,
        event_type: AuditEventType,
        user_id: &str,
        ip_address: Option<&str>,
        description: impl Into<String>,
        severity: AuditSeverity,
    ) -> AuditResult<AuditEntry> {
        let severity = match event_type {
            AuditEventType::LoginFailed | AuditEventType::SecurityAlert => {
                severity.max(AuditSeverity::High)
            }
            _ => severity,
        };

        let mut entry = AuditEntry::new(event_type, description)
            .user(user_id)
            .resource("security", user_id)
            .severity(severity);
        entry.ip_address = ip_address.map(str::to_string);

        if severity >= AuditSeverity::High {
            tracing::warn!(user_id, event_type = %event_type, "Security event");
        }

        self.log_event(entry).await
    }

    /// Filtered entries, newest-first. Page size defaults to 100.
    pub async fn query_audit_trail(&self, mut query: AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        query.limit.get_or_insert(DEFAULT_QUERY_LIMIT);
        self.store.query(&query).await
    }

    /// Counts by event type, severity, user and resource over a window
    pub async fn get_audit_summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AuditResult<AuditSummary> {
        let entries = self.store.query(&AuditQuery::window(start, end)).await?;

        let mut by_event_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut by_user = BTreeMap::new();
        let mut by_resource = BTreeMap::new();

        for entry in &entries {
            *by_event_type.entry(entry.event_type.to_string()).or_insert(0) += 1;
            *by_severity.entry(entry.severity.to_string()).or_insert(0) += 1;
            if let Some(ref user) = entry.user_id {
                *by_user.entry(user.clone()).or_insert(0) += 1;
            }
            if let Some(ref resource) = entry.resource_type {
                *by_resource.entry(resource.clone()).or_insert(0) += 1;
            }
        }

        Ok(AuditSummary {
            start,
            end,
            total_events: entries.len(),
            by_event_type,
            by_severity,
            by_user,
            by_resource,
        })
    }

    /// Security, payment and suspicious buckets plus critical issues
    pub async fn get_compliance_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AuditResult<ComplianceReport> {
        let entries = self.store.query(&AuditQuery::window(start, end)).await?;

        let mut report = ComplianceReport {
            start,
            end,
            total_events: entries.len(),
            security_events: Vec::new(),
            payment_events: Vec::new(),
            suspicious_activities: Vec::new(),
            compliance_issues: Vec::new(),
            generated_at: Utc::now(),
        };

        for entry in entries {
            match entry.event_type {
                AuditEventType::LoginFailed => report.security_events.push(entry.clone()),
                AuditEventType::SecurityAlert => {
                    report.security_events.push(entry.clone());
                    report.suspicious_activities.push(entry.clone());
                }
                AuditEventType::PaymentFailed | AuditEventType::PaymentCancelled => {
                    report.payment_events.push(entry.clone())
                }
                _ => {}
            }

            if entry.severity == AuditSeverity::Critical {
                report.compliance_issues.push(entry);
            }
        }

        Ok(report)
    }

    /// Count entries, missing timestamps and duplicate-looking groups
    pub async fn validate_audit_integrity(&self) -> AuditResult<AuditIntegrityReport> {
        let entries = self.store.query(&AuditQuery::default()).await?;

        let missing_timestamps = entries.iter().filter(|e| e.timestamp.is_none()).count();

        type Key = (
            AuditEventType,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<DateTime<Utc>>,
        );
        let mut groups: HashMap<Key, usize> = HashMap::new();
        for e in &entries {
            let key = (
                e.event_type,
                e.user_id.clone(),
                e.agent_id.clone(),
                e.resource_id.clone(),
                e.timestamp,
            );
            *groups.entry(key).or_insert(0) += 1;
        }

        let mut duplicate_groups: Vec<DuplicateGroup> = groups
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((event_type, user_id, agent_id, resource_id, timestamp), count)| DuplicateGroup {
                event_type,
                user_id,
                agent_id,
                resource_id,
                timestamp,
                count,
            })
            .collect();
        duplicate_groups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.event_type.cmp(&b.event_type)));

        let is_valid = missing_timestamps == 0 && duplicate_groups.is_empty();
        if !is_valid {
            tracing::warn!(
                missing_timestamps,
                duplicate_groups = duplicate_groups.len(),
                "Audit integrity check found issues"
            );
        }

        Ok(AuditIntegrityReport {
            total_entries: entries.len(),
            missing_timestamps,
            duplicate_groups,
            is_valid,
            checked_at: Utc::now(),
        })
    }

    /// Flag entries older than `before` as archived; returns how many
    pub async fn archive_old_entries(&self, before: DateTime<Utc>) -> AuditResult<u64> {
        let archived = self.store.archive_before(before).await?;
        tracing::info!(archived, before = %before, "Archived audit entries");
        Ok(archived)
    }

    /// Every entry for one resource, oldest first
    pub async fn get_change_history(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> AuditResult<Vec<AuditEntry>> {
        let mut entries = self
            .store
            .query(&AuditQuery::for_resource(resource_type, resource_id))
            .await?;
        entries.reverse();
        Ok(entries)
    }
}
