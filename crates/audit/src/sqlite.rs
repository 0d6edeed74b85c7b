//! SQLite-backed audit store

use crate::entry::{AuditEntry, AuditEventType, AuditSeverity};
use crate::error::{AuditError, AuditResult};
use crate::query::AuditQuery;
use crate::store::AuditStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

/// Fixed-width UTC layout so TEXT comparison orders chronologically
fn ts_to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_db(id: &str, raw: &str) -> AuditResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuditError::CorruptRecord {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}

fn json_to_db(value: &Option<serde_json::Value>) -> AuditResult<Option<String>> {
    value.as_ref().map(serde_json::to_string).transpose().map_err(Into::into)
}

fn json_from_db(raw: Option<String>) -> AuditResult<Option<serde_json::Value>> {
    raw.as_deref().map(serde_json::from_str).transpose().map_err(Into::into)
}

/// Audit store in a SQLite table
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table and indexes
    pub async fn init(&self) -> AuditResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                user_id TEXT,
                agent_id TEXT,
                resource_id TEXT,
                resource_type TEXT,
                action TEXT NOT NULL,
                description TEXT NOT NULL,
                old_values TEXT,
                new_values TEXT,
                metadata TEXT,
                ip_address TEXT,
                user_agent TEXT,
                session_id TEXT,
                correlation_id TEXT,
                timestamp TEXT,
                archived INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_entries(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_entries(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_agent ON audit_entries(agent_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_entries(resource_type, resource_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_event_type ON audit_entries(event_type)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn row_to_entry(row: &SqliteRow) -> AuditResult<AuditEntry> {
        let id: String = row.try_get("id")?;

        let event_type_raw: String = row.try_get("event_type")?;
        let event_type: AuditEventType =
            event_type_raw.parse().map_err(|_| AuditError::CorruptRecord {
                id: id.clone(),
                reason: format!("unknown event type '{}'", event_type_raw),
            })?;

        let severity_raw: String = row.try_get("severity")?;
        let severity: AuditSeverity =
            severity_raw.parse().map_err(|_| AuditError::CorruptRecord {
                id: id.clone(),
                reason: format!("unknown severity '{}'", severity_raw),
            })?;

        let timestamp = row
            .try_get::<Option<String>, _>("timestamp")?
            .map(|raw| ts_from_db(&id, &raw))
            .transpose()?;

        Ok(AuditEntry {
            event_type,
            severity,
            user_id: row.try_get("user_id")?,
            agent_id: row.try_get("agent_id")?,
            resource_id: row.try_get("resource_id")?,
            resource_type: row.try_get("resource_type")?,
            action: row.try_get("action")?,
            description: row.try_get("description")?,
            old_values: json_from_db(row.try_get("old_values")?)?,
            new_values: json_from_db(row.try_get("new_values")?)?,
            metadata: json_from_db(row.try_get("metadata")?)?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            session_id: row.try_get("session_id")?,
            correlation_id: row.try_get("correlation_id")?,
            timestamp,
            archived: row.try_get("archived")?,
            id,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert(&self, entry: &AuditEntry) -> AuditResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                id, event_type, severity, user_id, agent_id, resource_id, resource_type,
                action, description, old_values, new_values, metadata,
                ip_address, user_agent, session_id, correlation_id, timestamp, archived
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.event_type.to_string())
        .bind(entry.severity.to_string())
        .bind(&entry.user_id)
        .bind(&entry.agent_id)
        .bind(&entry.resource_id)
        .bind(&entry.resource_type)
        .bind(&entry.action)
        .bind(&entry.description)
        .bind(json_to_db(&entry.old_values)?)
        .bind(json_to_db(&entry.new_values)?)
        .bind(json_to_db(&entry.metadata)?)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.session_id)
        .bind(&entry.correlation_id)
        .bind(entry.timestamp.as_ref().map(ts_to_db))
        .bind(entry.archived)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM audit_entries WHERE 1 = 1");

        let text_filters = [
            ("user_id", &query.user_id),
            ("agent_id", &query.agent_id),
            ("resource_id", &query.resource_id),
            ("resource_type", &query.resource_type),
            ("ip_address", &query.ip_address),
        ];
        for (column, value) in text_filters {
            if let Some(value) = value {
                qb.push(format!(" AND {} = ", column)).push_bind(value.clone());
            }
        }

        if let Some(event_type) = query.event_type {
            qb.push(" AND event_type = ").push_bind(event_type.to_string());
        }
        if let Some(severity) = query.severity {
            qb.push(" AND severity = ").push_bind(severity.to_string());
        }
        if let Some(start) = query.start {
            qb.push(" AND timestamp >= ").push_bind(ts_to_db(&start));
        }
        if let Some(end) = query.end {
            qb.push(" AND timestamp <= ").push_bind(ts_to_db(&end));
        }
        if query.exclude_archived {
            qb.push(" AND archived = 0");
        }

        qb.push(" ORDER BY timestamp DESC, rowid DESC");

        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        let limit = query.limit.map_or(-1, |l| l as i64);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(query.offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn archive_before(&self, before: DateTime<Utc>) -> AuditResult<u64> {
        let result = sqlx::query(
            "UPDATE audit_entries SET archived = 1 WHERE archived = 0 AND timestamp IS NOT NULL AND timestamp < ?",
        )
        .bind(ts_to_db(&before))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
