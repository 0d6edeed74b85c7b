//! AgentPay Audit Trail
//!
//! Every mutating operation leaves an `AuditEntry`. Entries are immutable
//! apart from the `archived` flag, which a retention sweep may set; nothing
//! here ever deletes an entry.

pub mod entry;
pub mod error;
pub mod query;
pub mod report;
pub mod sqlite;
pub mod store;
pub mod trail;

pub use entry::{AuditEntry, AuditEventType, AuditSeverity};
pub use error::{AuditError, AuditResult};
pub use query::AuditQuery;
pub use report::{AuditIntegrityReport, AuditSummary, ComplianceReport, DuplicateGroup};
pub use sqlite::SqliteAuditStore;
pub use store::{AuditStore, InMemoryAuditStore};
pub use trail::AuditTrail;
