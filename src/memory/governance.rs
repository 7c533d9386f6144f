//! Proposal governance
//!
//! Gated record kinds (decisions and learnings by default) only become
//! canonical through a human: either by approving a pending [`Proposal`] or
//! by a human direct write. Ideas are never gated.
//!
//! Proposal states: `pending -> approved | rejected | expired`, all terminal.

use super::{RecordDraft, WorkspaceMemory};
use crate::audit::{self, content_hash, AuditEntry};
use crate::classifier::{classify, extract_tags, Classification};
use crate::error::{PalaceError, Result};
use crate::lifecycle;
use crate::storage::{self, enum_column, json_list_column, opt_ts_column, ts_column};
use crate::types::{
    new_id, Actor, Authority, ProposalKind, ProposalStatus, Proposal, Record, RecordKind, Scope,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const PROPOSAL_COLUMNS: &str = "id, proposed_as, content, scope, scope_path, source, rationale, \
     classification_confidence, classification_signals, dedupe_key, status, promoted_to_id, \
     reviewed_by, review_note, reviewed_at, created_at";

/// Actor recorded for automatic expiry
const MAINTENANCE_ACTOR: &str = "palace-maintenance";

/// A request to remember a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub content: String,
    pub scope: Scope,
    /// Where the text came from (session, file, tool); defaults to the actor id
    pub source: String,
    pub actor: Actor,
    /// Skip classification and store as this kind
    pub kind: Option<RecordKind>,
    /// Ask to bypass the proposal queue; only honoured for humans
    pub direct: bool,
    pub rationale: Option<String>,
    pub context: Option<String>,
    /// Initial confidence for a directly written learning
    pub confidence: Option<f64>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>, actor: Actor) -> Self {
        Self {
            content: content.into(),
            scope: Scope::Palace,
            source: actor.id().to_string(),
            actor,
            kind: None,
            direct: false,
            rationale: None,
            context: None,
            confidence: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    fn classification(&self) -> Classification {
        match self.kind {
            Some(kind) => Classification::explicit(kind),
            None => classify(&self.content),
        }
    }
}

/// What `store` did with the request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "action", content = "value")]
pub enum StoreAction {
    Written(Record),
    Proposed(Proposal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreResult {
    pub classification: Classification,
    /// Classification confidence fell below the confirmation threshold
    pub needs_confirmation: bool,
    pub action: StoreAction,
}

/// Deterministic identity of a proposal's content
///
/// SHA-256 hex of `kind \0 content \0 scope \0 scope_path`.
pub fn dedupe_key(kind: ProposalKind, content: &str, scope: &Scope) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.kind().as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.path().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl WorkspaceMemory {
    /// Classify and route a piece of text
    ///
    /// Ideas are written directly. Gated kinds become pending proposals
    /// unless a human asked for a direct write. Ungated kinds are written
    /// directly, unreviewed when an agent wrote them.
    pub fn store(&self, request: StoreRequest) -> Result<StoreResult> {
        let classification = request.classification();
        let needs_confirmation =
            classification.confidence < self.config.governance.confirmation_threshold;
        let kind = classification.kind;

        let action = if kind == RecordKind::Idea {
            StoreAction::Written(self.write_direct(&request, &classification, Authority::Approved, false)?)
        } else if self.config.governance.gated_kinds.contains(&kind) {
            if request.direct {
                request.actor.require_human("direct write of a gated record")?;
                StoreAction::Written(self.write_direct(&request, &classification, Authority::Approved, true)?)
            } else {
                StoreAction::Proposed(self.propose_classified(&request, &classification)?)
            }
        } else {
            let authority = if request.actor.is_human() {
                Authority::Approved
            } else {
                Authority::Unreviewed
            };
            StoreAction::Written(self.write_direct(&request, &classification, authority, false)?)
        };

        Ok(StoreResult {
            classification,
            needs_confirmation,
            action,
        })
    }

    fn write_direct(
        &self,
        request: &StoreRequest,
        classification: &Classification,
        authority: Authority,
        bypass: bool,
    ) -> Result<Record> {
        let confidence = match request.confidence {
            Some(c) => lifecycle::validate_confidence(c)?,
            None => self.initial_learning_confidence(classification.confidence),
        };
        let draft = RecordDraft {
            kind: classification.kind,
            content: request.content.clone(),
            scope: request.scope.clone(),
            source: request.source.clone(),
            authority,
            rationale: request.rationale.clone(),
            context: request.context.clone(),
            confidence,
            tags: extract_tags(&request.content),
        };
        let record = Self::insert_record(&self.conn, &draft, Utc::now())?;

        if record.kind() != RecordKind::Idea {
            self.audit(
                AuditEntry::new(
                    audit::DIRECT_WRITE,
                    &request.actor,
                    record.id(),
                    record.kind().as_str(),
                )
                .with_details(json!({
                    "content_sha256": content_hash(record.content()),
                    "authority": authority.as_str(),
                    "bypass": bypass,
                })),
            );
        }
        info!("Stored {} {} directly", record.kind(), record.id());
        Ok(record)
    }

    /// Learnings never start below the configured default
    fn initial_learning_confidence(&self, classification_confidence: f64) -> f64 {
        classification_confidence
            .max(self.config.governance.default_learning_confidence)
            .clamp(0.0, 1.0)
    }

    fn expiry_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        lifecycle::days_before(now, self.config.governance.proposal_expiry_days)
    }

    /// Queue text for human review
    pub fn propose(&self, request: &StoreRequest) -> Result<Proposal> {
        let classification = request.classification();
        self.propose_classified(request, &classification)
    }

    fn propose_classified(
        &self,
        request: &StoreRequest,
        classification: &Classification,
    ) -> Result<Proposal> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(PalaceError::Validation("content must not be empty".to_string()));
        }
        let kind = ProposalKind::try_from(classification.kind).map_err(|_| {
            PalaceError::Validation(
                "text classified as an idea; ideas are written directly, not proposed".to_string(),
            )
        })?;
        let scope = request.scope.normalized()?;
        let key = dedupe_key(kind, content, &scope);
        let now = storage::now();

        if let Some(existing) = self.pending_by_key(&key)? {
            if existing.created_at < self.expiry_cutoff(now)? {
                // Stale duplicate: retire it so the fresh proposal can take its place
                self.mark_expired(&existing.id, now)?;
            } else {
                return Err(PalaceError::DuplicateProposal {
                    existing_id: existing.id,
                });
            }
        }

        let proposal = Proposal {
            id: new_id("p"),
            proposed_as: kind,
            content: content.to_string(),
            scope,
            source: request.source.clone(),
            rationale: request.rationale.clone(),
            classification_confidence: classification.confidence,
            classification_signals: classification.signals.clone(),
            dedupe_key: key,
            status: ProposalStatus::Pending,
            promoted_to_id: None,
            reviewed_by: None,
            review_note: None,
            reviewed_at: None,
            created_at: now,
        };

        let inserted = self.conn.execute(
            &format!(
                "INSERT INTO proposals ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, NULL, NULL, ?12)",
                PROPOSAL_COLUMNS
            ),
            params![
                proposal.id,
                proposal.proposed_as.as_str(),
                proposal.content,
                proposal.scope.kind(),
                proposal.scope.path(),
                proposal.source,
                proposal.rationale,
                proposal.classification_confidence,
                serde_json::to_string(&proposal.classification_signals)?,
                proposal.dedupe_key,
                proposal.status.as_str(),
                storage::ts(proposal.created_at),
            ],
        );
        if let Err(e) = inserted {
            if is_constraint_violation(&e) {
                if let Some(existing) = self.pending_by_key(&proposal.dedupe_key)? {
                    return Err(PalaceError::DuplicateProposal {
                        existing_id: existing.id,
                    });
                }
            }
            return Err(e.into());
        }

        self.audit(
            AuditEntry::new(audit::PROPOSAL_CREATE, &request.actor, &proposal.id, "proposal")
                .with_details(json!({
                    "proposed_as": proposal.proposed_as.as_str(),
                    "classification_confidence": proposal.classification_confidence,
                    "dedupe_key": proposal.dedupe_key,
                })),
        );
        info!("Created proposal {} ({})", proposal.id, proposal.proposed_as);
        Ok(proposal)
    }

    /// Approve a pending proposal and materialize its record
    pub fn approve(&self, id: &str, reviewer: &Actor, note: Option<&str>) -> Result<Record> {
        self.approve_as_of(id, reviewer, note, Utc::now())
    }

    pub fn approve_as_of(
        &self,
        id: &str,
        reviewer: &Actor,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Record> {
        reviewer.require_human("approving a proposal")?;
        let proposal = self.get_proposal(id)?;
        if proposal.status != ProposalStatus::Pending {
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id,
                status: proposal.status,
            });
        }
        if proposal.created_at < self.expiry_cutoff(now)? {
            self.mark_expired(&proposal.id, now)?;
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id,
                status: ProposalStatus::Expired,
            });
        }

        let kind = RecordKind::from(proposal.proposed_as);
        let draft = RecordDraft {
            kind,
            content: proposal.content.clone(),
            scope: proposal.scope.clone(),
            source: proposal.source.clone(),
            authority: Authority::Approved,
            rationale: proposal.rationale.clone(),
            context: None,
            confidence: self.initial_learning_confidence(proposal.classification_confidence),
            tags: extract_tags(&proposal.content),
        };

        let tx = self.conn.unchecked_transaction()?;
        let record = Self::insert_record(&tx, &draft, now)?;
        let updated = tx.execute(
            "UPDATE proposals
             SET status = 'approved', promoted_to_id = ?1, reviewed_by = ?2, review_note = ?3, reviewed_at = ?4
             WHERE id = ?5 AND status = 'pending'",
            params![record.id(), reviewer.id(), note, storage::ts(now), proposal.id],
        )?;
        if updated == 0 {
            // Resolved by another writer between the read and this transaction
            let current = status_of(&tx, &proposal.id)?;
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id,
                status: current,
            });
        }
        tx.commit()?;

        self.audit(
            AuditEntry::new(audit::PROPOSAL_APPROVE, reviewer, &proposal.id, "proposal")
                .with_details(json!({
                    "promoted_to_id": record.id(),
                    "kind": kind.as_str(),
                    "note": note,
                })),
        );
        info!("Approved proposal {} as {} {}", proposal.id, kind, record.id());
        Ok(record)
    }

    /// Reject a pending proposal; no record is written
    pub fn reject(&self, id: &str, reviewer: &Actor, note: Option<&str>) -> Result<Proposal> {
        self.reject_as_of(id, reviewer, note, Utc::now())
    }

    pub fn reject_as_of(
        &self,
        id: &str,
        reviewer: &Actor,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Proposal> {
        reviewer.require_human("rejecting a proposal")?;
        let proposal = self.get_proposal(id)?;
        if proposal.status != ProposalStatus::Pending {
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id,
                status: proposal.status,
            });
        }
        if proposal.created_at < self.expiry_cutoff(now)? {
            self.mark_expired(&proposal.id, now)?;
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id,
                status: ProposalStatus::Expired,
            });
        }

        let updated = self.conn.execute(
            "UPDATE proposals SET status = 'rejected', reviewed_by = ?1, review_note = ?2, reviewed_at = ?3
             WHERE id = ?4 AND status = 'pending'",
            params![reviewer.id(), note, storage::ts(now), proposal.id],
        )?;
        if updated == 0 {
            return Err(PalaceError::AlreadyResolved {
                id: proposal.id.clone(),
                status: status_of(&self.conn, &proposal.id)?,
            });
        }

        self.audit(
            AuditEntry::new(audit::PROPOSAL_REJECT, reviewer, &proposal.id, "proposal")
                .with_details(json!({ "note": note })),
        );
        info!("Rejected proposal {}", proposal.id);
        self.get_proposal(id)
    }

    /// Expire pending proposals past the configured age; returns their ids
    pub fn expire_proposals(&self) -> Result<Vec<String>> {
        self.expire_proposals_as_of(Utc::now())
    }

    pub fn expire_proposals_as_of(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = storage::ts(self.expiry_cutoff(now)?);
        let candidates: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM proposals WHERE status = 'pending' AND created_at < ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut expired = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self.mark_expired(&id, now)? {
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            info!("Expired {} stale proposals", expired.len());
        }
        Ok(expired)
    }

    fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE proposals SET status = 'expired', reviewed_at = ?1 WHERE id = ?2 AND status = 'pending'",
            params![storage::ts(now), id],
        )?;
        if updated == 0 {
            return Ok(false);
        }
        self.audit(AuditEntry::new(
            audit::PROPOSAL_EXPIRE,
            &Actor::agent(MAINTENANCE_ACTOR),
            id,
            "proposal",
        ));
        debug!("Proposal {} expired", id);
        Ok(true)
    }

    pub fn get_proposal(&self, id: &str) -> Result<Proposal> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM proposals WHERE id = ?1", PROPOSAL_COLUMNS),
                params![id],
                proposal_from_row,
            )
            .optional()?
            .ok_or_else(|| PalaceError::not_found("proposal", id))
    }

    /// Pending proposals still within the review window, oldest first
    pub fn pending_proposals(&self) -> Result<Vec<Proposal>> {
        self.list_proposals(ProposalStatus::Pending)
    }

    /// Proposals in `status`; pending listings leave out rows past expiry
    pub fn list_proposals(&self, status: ProposalStatus) -> Result<Vec<Proposal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM proposals WHERE status = ?1 AND (?1 != 'pending' OR created_at >= ?2)
             ORDER BY created_at",
            PROPOSAL_COLUMNS
        ))?;
        let cutoff = storage::ts(self.expiry_cutoff(Utc::now())?);
        let rows = stmt.query_map(params![status.as_str(), cutoff], proposal_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn pending_by_key(&self, key: &str) -> Result<Option<Proposal>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM proposals WHERE dedupe_key = ?1 AND status = 'pending'",
                    PROPOSAL_COLUMNS
                ),
                params![key],
                proposal_from_row,
            )
            .optional()?)
    }
}

fn status_of(conn: &Connection, id: &str) -> Result<ProposalStatus> {
    let raw: String = conn.query_row(
        "SELECT status FROM proposals WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    raw.parse()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    Ok(Proposal {
        id: row.get(0)?,
        proposed_as: enum_column(row, 1)?,
        content: row.get(2)?,
        scope: super::scope_column(row, 3)?,
        source: row.get(5)?,
        rationale: row.get(6)?,
        classification_confidence: row.get(7)?,
        classification_signals: json_list_column(row, 8)?,
        dedupe_key: row.get(9)?,
        status: enum_column(row, 10)?,
        promoted_to_id: row.get(11)?,
        reviewed_by: row.get(12)?,
        review_note: row.get(13)?,
        reviewed_at: opt_ts_column(row, 14)?,
        created_at: ts_column(row, 15)?,
    })
}
