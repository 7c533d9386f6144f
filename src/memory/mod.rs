//! Workspace memory store
//!
//! [`WorkspaceMemory`] owns the SQLite database at `<root>/.palace/memory.db`
//! and every operation on the records it holds: record creation and lookup,
//! tags, status changes, the proposal workflow ([`governance`]), the link
//! graph ([`links`]) and confidence maintenance of learnings.

pub mod governance;
pub mod links;

use crate::artifact::{shared_artifact_path, SharedArtifact, SharedLearning};
use crate::audit::{self, AuditEntry, AuditSink};
use crate::config::{PalaceConfig, WORKSPACE_MARKER};
use crate::error::{PalaceError, Result};
use crate::lifecycle::{self, LearningTable, MaintenanceReport};
use crate::oracle::{FileOracle, FsOracle};
use crate::storage::{self, enum_column, opt_ts_column, schema::WORKSPACE_SCHEMA, ts_column};
use crate::types::{
    new_id, Authority, Decision, DecisionOutcome, DecisionStatus, Idea, IdeaStatus, Learning,
    Record, RecordKind, Scope,
};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub use governance::{StoreAction, StoreRequest, StoreResult};
pub use links::{infer_kind, CodeRef, StaleLink, StaleReason};

/// Database file inside the workspace marker directory
pub const MEMORY_DB: &str = "memory.db";

const IDEA_COLUMNS: &str = "id, content, scope, scope_path, source, status, context, created_at";
const DECISION_COLUMNS: &str = "id, content, scope, scope_path, source, status, outcome, \
     outcome_note, reviewed_at, rationale, authority, created_at";
const LEARNING_COLUMNS: &str = "id, content, scope, scope_path, source, confidence, use_count, \
     last_used, authority, created_at";

/// Filter for record listings and substring search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub scope: Option<Scope>,
    pub tag: Option<String>,
    /// Case-insensitive substring of the content
    pub query: Option<String>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into().to_lowercase());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Fields of a record about to be written
#[derive(Debug, Clone)]
pub(crate) struct RecordDraft {
    pub kind: RecordKind,
    pub content: String,
    pub scope: Scope,
    pub source: String,
    pub authority: Authority,
    pub rationale: Option<String>,
    pub context: Option<String>,
    pub confidence: f64,
    pub tags: Vec<String>,
}

/// Handle on one workspace's memory
pub struct WorkspaceMemory {
    conn: Connection,
    root: PathBuf,
    name: String,
    config: PalaceConfig,
    oracle: Box<dyn FileOracle>,
    audit_sink: Option<Box<dyn AuditSink>>,
}

impl WorkspaceMemory {
    /// Open (creating if needed) the store of the workspace at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let config = PalaceConfig::load(root)?;
        Self::open_with_config(root, config)
    }

    pub fn open_with_config(root: impl AsRef<Path>, config: PalaceConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        config.validate()?;
        let conn = storage::open(&Self::db_path(&root), WORKSPACE_SCHEMA)?;
        info!("Workspace memory opened at {}", root.display());
        Ok(Self::from_parts(conn, root, config))
    }

    /// Store backed by an in-memory database; code links still resolve
    /// against `root`
    pub fn open_in_memory(root: impl AsRef<Path>, config: PalaceConfig) -> Result<Self> {
        config.validate()?;
        let conn = storage::open_in_memory(WORKSPACE_SCHEMA)?;
        Ok(Self::from_parts(conn, root.as_ref().to_path_buf(), config))
    }

    /// Open another workspace's existing store without write access
    pub fn open_read_only(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let conn = storage::open_read_only(&Self::db_path(&root))?;
        let config = PalaceConfig::load(&root).unwrap_or_else(|e| {
            warn!("Ignoring unreadable config in {}: {}", root.display(), e);
            PalaceConfig::default()
        });
        Ok(Self::from_parts(conn, root, config))
    }

    fn from_parts(conn: Connection, root: PathBuf, config: PalaceConfig) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        Self {
            conn,
            root,
            name,
            config,
            oracle: Box::new(FsOracle),
            audit_sink: None,
        }
    }

    /// Replace the filesystem oracle used for code links
    pub fn with_oracle(mut self, oracle: impl FileOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    /// Send audit entries to `sink` instead of the `audit_log` table
    pub fn with_audit_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit_sink = Some(Box::new(sink));
        self
    }

    /// Override the name used when exporting (defaults to the root's directory name)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn db_path(root: &Path) -> PathBuf {
        root.join(WORKSPACE_MARKER).join(MEMORY_DB)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PalaceConfig {
        &self.config
    }

    // ---- audit ----

    /// Deliver an audit entry; failures are logged and swallowed
    pub fn audit(&self, entry: AuditEntry) {
        let result = match &self.audit_sink {
            Some(sink) => sink.append(&entry),
            None => audit::insert_entry(&self.conn, &entry),
        };
        if let Err(e) = result {
            warn!(
                "Failed to record audit entry {} for {}: {}",
                entry.action, entry.target_id, e
            );
        }
    }

    /// Most recent entries of the built-in audit table
    pub fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        audit::list_entries(&self.conn, limit)
    }

    // ---- records ----

    pub(crate) fn insert_record(
        conn: &Connection,
        draft: &RecordDraft,
        now: DateTime<Utc>,
    ) -> Result<Record> {
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(PalaceError::Validation("content must not be empty".to_string()));
        }
        let scope = draft.scope.normalized()?;
        let id = new_id(draft.kind.id_prefix());
        let now = now.trunc_subsecs(6);
        let stamp = storage::ts(now);

        let record = match draft.kind {
            RecordKind::Idea => {
                let context = draft.context.clone().unwrap_or_default();
                conn.execute(
                    "INSERT INTO ideas (id, content, scope, scope_path, source, status, context, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        id,
                        content,
                        scope.kind(),
                        scope.path(),
                        draft.source,
                        IdeaStatus::Active.as_str(),
                        context,
                        stamp
                    ],
                )?;
                Record::Idea(Idea {
                    id: id.clone(),
                    content: content.to_string(),
                    scope: scope.clone(),
                    source: draft.source.clone(),
                    status: IdeaStatus::Active,
                    context,
                    tags: Vec::new(),
                    created_at: now,
                })
            }
            RecordKind::Decision => {
                let rationale = draft.rationale.clone().unwrap_or_default();
                conn.execute(
                    "INSERT INTO decisions (id, content, scope, scope_path, source, status, outcome, rationale, authority, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        id,
                        content,
                        scope.kind(),
                        scope.path(),
                        draft.source,
                        DecisionStatus::Proposed.as_str(),
                        DecisionOutcome::Unknown.as_str(),
                        rationale,
                        draft.authority.as_str(),
                        stamp
                    ],
                )?;
                Record::Decision(Decision {
                    id: id.clone(),
                    content: content.to_string(),
                    scope: scope.clone(),
                    source: draft.source.clone(),
                    status: DecisionStatus::Proposed,
                    outcome: DecisionOutcome::Unknown,
                    outcome_note: None,
                    reviewed_at: None,
                    rationale,
                    authority: draft.authority,
                    tags: Vec::new(),
                    created_at: now,
                })
            }
            RecordKind::Learning => {
                let confidence = lifecycle::validate_confidence(draft.confidence)?;
                conn.execute(
                    "INSERT INTO learnings (id, content, scope, scope_path, source, confidence, use_count, last_used, authority, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?7)",
                    params![
                        id,
                        content,
                        scope.kind(),
                        scope.path(),
                        draft.source,
                        confidence,
                        stamp,
                        draft.authority.as_str()
                    ],
                )?;
                Record::Learning(Learning {
                    id: id.clone(),
                    content: content.to_string(),
                    scope: scope.clone(),
                    source: draft.source.clone(),
                    confidence,
                    use_count: 0,
                    last_used: now,
                    authority: draft.authority,
                    tags: Vec::new(),
                    created_at: now,
                })
            }
        };

        insert_tags(conn, &id, &draft.tags)?;
        debug!("Created {} {}", draft.kind, id);
        Self::with_tags(conn, record)
    }

    fn with_tags(conn: &Connection, mut record: Record) -> Result<Record> {
        let tags = tags_for(conn, record.id())?;
        match &mut record {
            Record::Idea(r) => r.tags = tags,
            Record::Decision(r) => r.tags = tags,
            Record::Learning(r) => r.tags = tags,
        }
        Ok(record)
    }

    /// Kind of the record with this id, if it exists
    pub(crate) fn find_record_kind(conn: &Connection, id: &str) -> Result<Option<RecordKind>> {
        for kind in [RecordKind::Idea, RecordKind::Decision, RecordKind::Learning] {
            if record_exists(conn, kind, id)? {
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }

    pub fn get_record(&self, id: &str) -> Result<Record> {
        let kind = Self::find_record_kind(&self.conn, id)?
            .ok_or_else(|| PalaceError::not_found("record", id))?;
        self.get_kind(kind, id)
    }

    fn get_kind(&self, kind: RecordKind, id: &str) -> Result<Record> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns(kind),
            kind.table()
        );
        let record = self
            .conn
            .query_row(&sql, params![id], |row| record_from_row(kind, row))
            .optional()?
            .ok_or_else(|| PalaceError::not_found(kind.as_str(), id))?;
        Self::with_tags(&self.conn, record)
    }

    pub fn get_idea(&self, id: &str) -> Result<Idea> {
        match self.get_kind(RecordKind::Idea, id)? {
            Record::Idea(idea) => Ok(idea),
            _ => Err(PalaceError::not_found("idea", id)),
        }
    }

    pub fn get_decision(&self, id: &str) -> Result<Decision> {
        match self.get_kind(RecordKind::Decision, id)? {
            Record::Decision(decision) => Ok(decision),
            _ => Err(PalaceError::not_found("decision", id)),
        }
    }

    pub fn get_learning(&self, id: &str) -> Result<Learning> {
        match self.get_kind(RecordKind::Learning, id)? {
            Record::Learning(learning) => Ok(learning),
            _ => Err(PalaceError::not_found("learning", id)),
        }
    }

    /// Records matching `filter`, newest first
    pub fn list_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let kinds = match filter.kind {
            Some(kind) => vec![kind],
            None => vec![RecordKind::Idea, RecordKind::Decision, RecordKind::Learning],
        };

        let mut records = Vec::new();
        for kind in kinds {
            records.extend(self.select_records(kind, filter)?);
        }
        records.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Case-insensitive substring search over record content
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Record>> {
        self.list_records(&RecordFilter::new().with_query(query).with_limit(limit))
    }

    pub fn list_ideas(&self) -> Result<Vec<Idea>> {
        Ok(self
            .select_records(RecordKind::Idea, &RecordFilter::default())?
            .into_iter()
            .filter_map(|r| match r {
                Record::Idea(idea) => Some(idea),
                _ => None,
            })
            .collect())
    }

    pub fn list_decisions(&self) -> Result<Vec<Decision>> {
        Ok(self
            .select_records(RecordKind::Decision, &RecordFilter::default())?
            .into_iter()
            .filter_map(|r| match r {
                Record::Decision(decision) => Some(decision),
                _ => None,
            })
            .collect())
    }

    pub fn list_learnings(&self) -> Result<Vec<Learning>> {
        Ok(self
            .select_records(RecordKind::Learning, &RecordFilter::default())?
            .into_iter()
            .filter_map(|r| match r {
                Record::Learning(learning) => Some(learning),
                _ => None,
            })
            .collect())
    }

    fn select_records(&self, kind: RecordKind, filter: &RecordFilter) -> Result<Vec<Record>> {
        let mut sql = format!(
            "SELECT {} FROM {} t WHERE 1 = 1",
            columns(kind),
            kind.table()
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(scope) = &filter.scope {
            args.push(scope.kind().to_string());
            sql.push_str(&format!(" AND t.scope = ?{}", args.len()));
            args.push(scope.path().to_string());
            sql.push_str(&format!(" AND t.scope_path = ?{}", args.len()));
        }
        if let Some(tag) = &filter.tag {
            args.push(tag.to_lowercase());
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM record_tags rt WHERE rt.record_id = t.id AND rt.tag = ?{})",
                args.len()
            ));
        }
        if let Some(query) = &filter.query {
            args.push(storage::like_pattern(query));
            sql.push_str(&format!(" AND t.content LIKE ?{} ESCAPE '\\'", args.len()));
        }
        sql.push_str(" ORDER BY t.created_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            record_from_row(kind, row)
        })?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        records
            .into_iter()
            .map(|record| Self::with_tags(&self.conn, record))
            .collect()
    }

    // ---- tags ----

    /// Add tags to a record; returns the full tag set afterwards
    pub fn add_tags(&self, id: &str, tags: &[&str]) -> Result<Vec<String>> {
        if Self::find_record_kind(&self.conn, id)?.is_none() {
            return Err(PalaceError::not_found("record", id));
        }
        let normalized = tags
            .iter()
            .map(|t| {
                let tag = t.trim().to_lowercase();
                if tag.is_empty() {
                    Err(PalaceError::Validation("tags must not be empty".to_string()))
                } else {
                    Ok(tag)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        insert_tags(&self.conn, id, &normalized)?;
        tags_for(&self.conn, id)
    }

    pub fn tags(&self, id: &str) -> Result<Vec<String>> {
        tags_for(&self.conn, id)
    }

    // ---- status and outcome ----

    pub fn set_idea_status(&self, id: &str, status: IdeaStatus) -> Result<Idea> {
        let updated = self.conn.execute(
            "UPDATE ideas SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), storage::ts(Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(PalaceError::not_found("idea", id));
        }
        self.get_idea(id)
    }

    pub fn set_decision_status(&self, id: &str, status: DecisionStatus) -> Result<Decision> {
        let updated = self.conn.execute(
            "UPDATE decisions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), storage::ts(Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(PalaceError::not_found("decision", id));
        }
        self.get_decision(id)
    }

    /// Record the reviewed outcome of a decision, replacing any earlier one
    pub fn record_outcome(
        &self,
        id: &str,
        outcome: DecisionOutcome,
        note: Option<&str>,
    ) -> Result<Decision> {
        if outcome == DecisionOutcome::Unknown {
            return Err(PalaceError::Validation(
                "outcome must be successful, failed or mixed".to_string(),
            ));
        }
        let now = storage::ts(Utc::now());
        let updated = self.conn.execute(
            "UPDATE decisions SET outcome = ?1, outcome_note = ?2, reviewed_at = ?3, updated_at = ?3
             WHERE id = ?4",
            params![outcome.as_str(), note, now, id],
        )?;
        if updated == 0 {
            return Err(PalaceError::not_found("decision", id));
        }
        info!("Recorded outcome {} for decision {}", outcome, id);
        self.get_decision(id)
    }

    // ---- learning lifecycle ----

    pub fn reinforce_learning(&self, id: &str) -> Result<Learning> {
        lifecycle::reinforce(&self.conn, LearningTable::Workspace, id, Utc::now())?;
        self.get_learning(id)
    }

    /// Decay learnings unused for `older_than_days`; returns the affected count
    pub fn decay_learnings(&self, older_than_days: i64, delta: f64) -> Result<usize> {
        self.decay_learnings_as_of(Utc::now(), older_than_days, delta)
    }

    pub fn decay_learnings_as_of(
        &self,
        now: DateTime<Utc>,
        older_than_days: i64,
        delta: f64,
    ) -> Result<usize> {
        let outcome =
            lifecycle::decay(&self.conn, LearningTable::Workspace, now, older_than_days, delta)?;
        Ok(outcome.affected)
    }

    /// Remove learnings below `floor` together with their tags and links
    pub fn prune_learnings(&self, floor: f64) -> Result<usize> {
        let outcome = lifecycle::prune(&self.conn, LearningTable::Workspace, floor, drop_dependents)?;
        Ok(outcome.removed.len())
    }

    /// Decay, prune and expire proposals using the configured defaults
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.run_maintenance_as_of(Utc::now())
    }

    pub fn run_maintenance_as_of(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let start = Instant::now();
        let settings = &self.config.lifecycle;
        let mut report = MaintenanceReport::default();

        let decayed = lifecycle::decay(
            &self.conn,
            LearningTable::Workspace,
            now,
            settings.decay_after_days,
            settings.decay_delta,
        )?;
        report.decayed = decayed.affected;
        report.errors += decayed.errors;

        let pruned = lifecycle::prune(
            &self.conn,
            LearningTable::Workspace,
            settings.confidence_floor,
            drop_dependents,
        )?;
        report.pruned = pruned.removed.len();
        report.errors += pruned.errors;

        let expired = self.expire_proposals_as_of(now)?;
        report.proposals_expired = expired.len();

        report.duration = start.elapsed();
        info!(
            "Maintenance complete: {} decayed, {} pruned, {} proposals expired, {} errors",
            report.decayed, report.pruned, report.proposals_expired, report.errors
        );
        Ok(report)
    }

    // ---- export ----

    /// Learnings at or above `min_confidence`, most confident first
    pub fn export_shareable(&self, min_confidence: f64) -> Result<SharedArtifact> {
        lifecycle::validate_confidence(min_confidence)?;
        let mut learnings: Vec<SharedLearning> = self
            .list_learnings()?
            .iter()
            .filter(|l| l.confidence >= min_confidence)
            .map(SharedLearning::from)
            .collect();
        learnings.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(SharedArtifact::new(self.name.clone(), learnings))
    }

    /// Export and publish to `.palace/outputs/shared-learnings.json`
    pub fn write_shareable(&self, min_confidence: f64) -> Result<PathBuf> {
        let artifact = self.export_shareable(min_confidence)?;
        let path = shared_artifact_path(&self.root);
        artifact.write_to(&path)?;
        info!(
            "Published {} learnings to {}",
            artifact.learnings.len(),
            path.display()
        );
        Ok(path)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Remove tags and links that reference a learning being pruned
fn drop_dependents(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM record_tags WHERE record_id = ?1", params![id])?;
    conn.execute(
        "DELETE FROM links WHERE source_id = ?1 OR target_id = ?1",
        params![id],
    )?;
    Ok(())
}

pub(crate) fn record_exists(conn: &Connection, kind: RecordKind, id: &str) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", kind.table());
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

fn insert_tags(conn: &Connection, id: &str, tags: &[String]) -> Result<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO record_tags (record_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(())
}

fn tags_for(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM record_tags WHERE record_id = ?1 ORDER BY rowid")?;
    let rows = stmt.query_map(params![id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
}

fn columns(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Idea => IDEA_COLUMNS,
        RecordKind::Decision => DECISION_COLUMNS,
        RecordKind::Learning => LEARNING_COLUMNS,
    }
}

fn created_at(record: &Record) -> DateTime<Utc> {
    match record {
        Record::Idea(r) => r.created_at,
        Record::Decision(r) => r.created_at,
        Record::Learning(r) => r.created_at,
    }
}

/// Read the (scope, scope_path) column pair starting at `idx`
pub(crate) fn scope_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Scope> {
    let kind: String = row.get(idx)?;
    let path: String = row.get(idx + 1)?;
    Scope::from_parts(&kind, &path)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(kind: RecordKind, row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(match kind {
        RecordKind::Idea => Record::Idea(Idea {
            id: row.get(0)?,
            content: row.get(1)?,
            scope: scope_column(row, 2)?,
            source: row.get(4)?,
            status: enum_column(row, 5)?,
            context: row.get(6)?,
            tags: Vec::new(),
            created_at: ts_column(row, 7)?,
        }),
        RecordKind::Decision => Record::Decision(Decision {
            id: row.get(0)?,
            content: row.get(1)?,
            scope: scope_column(row, 2)?,
            source: row.get(4)?,
            status: enum_column(row, 5)?,
            outcome: enum_column(row, 6)?,
            outcome_note: row.get(7)?,
            reviewed_at: opt_ts_column(row, 8)?,
            rationale: row.get(9)?,
            authority: enum_column(row, 10)?,
            tags: Vec::new(),
            created_at: ts_column(row, 11)?,
        }),
        RecordKind::Learning => Record::Learning(Learning {
            id: row.get(0)?,
            content: row.get(1)?,
            scope: scope_column(row, 2)?,
            source: row.get(4)?,
            confidence: row.get(5)?,
            use_count: row.get(6)?,
            last_used: ts_column(row, 7)?,
            authority: enum_column(row, 8)?,
            tags: Vec::new(),
            created_at: ts_column(row, 9)?,
        }),
    })
}
