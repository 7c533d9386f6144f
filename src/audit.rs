//! Append-only audit trail for governed writes
//!
//! Every proposal transition and every direct write emits an [`AuditEntry`].
//! Delivery is best-effort: a failing sink is logged and never rolls back
//! the operation that produced the entry.

use crate::error::Result;
use crate::storage::{self, enum_column, ts_column};
use crate::types::{Actor, ActorType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

pub const PROPOSAL_CREATE: &str = "proposal.create";
pub const PROPOSAL_APPROVE: &str = "proposal.approve";
pub const PROPOSAL_REJECT: &str = "proposal.reject";
pub const PROPOSAL_EXPIRE: &str = "proposal.expire";
pub const DIRECT_WRITE: &str = "record.direct_write";

/// One audited action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub target_id: String,
    pub target_kind: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: &str,
        actor: &Actor,
        target_id: impl Into<String>,
        target_kind: impl Into<String>,
    ) -> Self {
        Self {
            action: action.to_string(),
            actor_type: actor.actor_type(),
            actor_id: actor.id().to_string(),
            target_id: target_id.into(),
            target_kind: target_kind.into(),
            details: serde_json::Value::Object(Default::default()),
            timestamp: storage::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Destination for audit entries
pub trait AuditSink: Send {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
}

/// Sink that keeps entries in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for RecordingAuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| crate::error::PalaceError::Other("audit buffer poisoned".into()))?;
        entries.push(entry.clone());
        Ok(())
    }
}

/// SHA-256 hex digest of record content, audited in place of the raw text
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn insert_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO audit_log (action, actor_type, actor_id, target_id, target_kind, details, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            entry.action,
            entry.actor_type.as_str(),
            entry.actor_id,
            entry.target_id,
            entry.target_kind,
            serde_json::to_string(&entry.details)?,
            storage::ts(entry.timestamp),
        ],
    )?;
    Ok(())
}

/// Most recent entries first
pub(crate) fn list_entries(conn: &Connection, limit: usize) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT action, actor_type, actor_id, target_id, target_kind, details, timestamp
        FROM audit_log ORDER BY id DESC LIMIT ?1
        "#,
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        let details: String = row.get(5)?;
        Ok(AuditEntry {
            action: row.get(0)?,
            actor_type: enum_column(row, 1)?,
            actor_id: row.get(2)?,
            target_id: row.get(3)?,
            target_kind: row.get(4)?,
            details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
            timestamp: ts_column(row, 6)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
