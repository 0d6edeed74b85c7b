//! Audit query filters

use crate::entry::{AuditEntry, AuditEventType, AuditSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default page size for `AuditTrail::query_audit_trail`
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Any combination of filters; unset fields match everything.
///
/// Results are always newest-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub severity: Option<AuditSeverity>,
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub exclude_archived: bool,
    /// `None` means unbounded at the store level
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AuditQuery {
    /// Everything between two instants, unpaged
    pub fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    /// All entries touching one resource
    pub fn for_resource(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: Some(resource_id.into()),
            ..Default::default()
        }
    }

    /// Filter check used by in-memory stores. Paging is applied separately.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        fn eq(filter: &Option<String>, value: &Option<String>) -> bool {
            filter.as_ref().map_or(true, |f| value.as_ref() == Some(f))
        }

        if !eq(&self.user_id, &entry.user_id)
            || !eq(&self.agent_id, &entry.agent_id)
            || !eq(&self.resource_id, &entry.resource_id)
            || !eq(&self.resource_type, &entry.resource_type)
            || !eq(&self.ip_address, &entry.ip_address)
        {
            return false;
        }

        if self.event_type.is_some_and(|t| t != entry.event_type) {
            return false;
        }

        if self.severity.is_some_and(|s| s != entry.severity) {
            return false;
        }

        if self.exclude_archived && entry.archived {
            return false;
        }

        if self.start.is_some() || self.end.is_some() {
            let Some(ts) = entry.timestamp else {
                return false;
            };
            if self.start.is_some_and(|start| ts < start) || self.end.is_some_and(|end| ts > end) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_empty_query_matches_everything() {
        let entry = AuditEntry::new(AuditEventType::Logout, "bye");
        assert!(AuditQuery::default().matches(&entry));
    }

    #[test]
    fn test_field_filters() {
        let entry = AuditEntry::new(AuditEventType::TransactionPosted, "posted")
            .agent("agent-a")
            .resource("transaction", "tx-1");

        let hit = AuditQuery {
            agent_id: Some("agent-a".into()),
            event_type: Some(AuditEventType::TransactionPosted),
            ..Default::default()
        };
        assert!(hit.matches(&entry));

        let miss = AuditQuery {
            agent_id: Some("agent-b".into()),
            ..Default::default()
        };
        assert!(!miss.matches(&entry));

        assert!(AuditQuery::for_resource("transaction", "tx-1").matches(&entry));
        assert!(!AuditQuery::for_resource("account", "tx-1").matches(&entry));
    }

    #[test]
    fn test_window_excludes_untimestamped() {
        let now = Utc::now();
        let query = AuditQuery::window(now - Duration::hours(1), now + Duration::hours(1));

        let stamped = AuditEntry::new(AuditEventType::Logout, "bye").at(now);
        let unstamped = AuditEntry::new(AuditEventType::Logout, "bye");
        let late = AuditEntry::new(AuditEventType::Logout, "bye").at(now + Duration::hours(2));

        assert!(query.matches(&stamped));
        assert!(!query.matches(&unstamped));
        assert!(!query.matches(&late));
    }
}
