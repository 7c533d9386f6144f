//! Link graph between records and code locations
//!
//! Links are directed: the source is always a record, the target is a
//! record or a code location `path[:start[-end]]` relative to the workspace
//! root. Code targets snapshot the file's mtime when linked; a link is stale
//! when the file is gone or its mtime moved. Staleness is computed on
//! demand and never written back.

use super::{record_exists, WorkspaceMemory};
use crate::error::{PalaceError, Result};
use crate::oracle::FileState;
use crate::storage::{self, enum_column, ts_column};
use crate::types::{new_id, Direction, Link, NodeKind, RecordKind, Relation, ID_SUFFIX_LEN};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const LINK_COLUMNS: &str =
    "id, source_id, source_kind, target_id, target_kind, relation, target_mtime, created_at";

static RECORD_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^([idl])_[0-9a-f]{{{}}}$", ID_SUFFIX_LEN)).expect("valid record id pattern")
});

static LINE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":(\d+)(?:-(\d+))?$").expect("valid line suffix pattern"));

/// Guess what an endpoint string refers to
///
/// * `i_`/`d_`/`l_` followed by 12 lowercase hex digits is a record id.
/// * Anything with a path separator, a `:line` / `:start-end` suffix or a
///   file extension on its last segment is code.
/// * Everything else (`Makefile`, `foo`) is unknown and needs an explicit kind.
pub fn infer_kind(target: &str) -> Option<NodeKind> {
    if let Some(caps) = RECORD_ID_RE.captures(target) {
        return match &caps[1] {
            "i" => Some(NodeKind::Idea),
            "d" => Some(NodeKind::Decision),
            _ => Some(NodeKind::Learning),
        };
    }
    if target.contains('/') || target.contains('\\') || LINE_SUFFIX_RE.is_match(target) {
        return Some(NodeKind::Code);
    }
    match target.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < target.len() => Some(NodeKind::Code),
        _ => None,
    }
}

/// Parsed code location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRef {
    pub path: String,
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl CodeRef {
    /// Parse `path[:start[-end]]`
    ///
    /// A suffix after the last `:` must be a line number or a range with
    /// `1 <= start <= end`.
    pub fn parse(target: &str) -> Result<Self> {
        let malformed =
            |why: &str| PalaceError::UnresolvableReference(format!("{}: {}", target, why));

        let (path, range) = match target.rsplit_once(':') {
            Some((path, suffix)) => (path, Some(suffix)),
            None => (target, None),
        };
        if path.trim().is_empty() {
            return Err(malformed("empty path"));
        }
        let escapes_root = Path::new(path)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes_root {
            return Err(malformed("path must stay inside the workspace"));
        }

        let (start, end) = match range {
            None => (None, None),
            Some(suffix) => {
                let (start, end) = match suffix.split_once('-') {
                    Some((s, e)) => (s, Some(e)),
                    None => (suffix, None),
                };
                let start: u32 = start
                    .parse()
                    .map_err(|_| malformed("line range must be numeric"))?;
                let end: Option<u32> = end
                    .map(|e| e.parse().map_err(|_| malformed("line range must be numeric")))
                    .transpose()?;
                if start == 0 {
                    return Err(malformed("lines are numbered from 1"));
                }
                if let Some(end) = end {
                    if end < start {
                        return Err(malformed("range end precedes start"));
                    }
                }
                (Some(start), end)
            }
        };

        Ok(Self {
            path: path.to_string(),
            start,
            end,
        })
    }
}

/// Why a code link is stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StaleReason {
    Missing,
    Modified { snapshot: Option<i64>, current: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleLink {
    pub link: Link,
    pub reason: StaleReason,
}

impl WorkspaceMemory {
    /// Link two endpoints, inferring both kinds
    pub fn add_link(&self, source: &str, target: &str, relation: Relation) -> Result<Link> {
        self.add_link_with_kinds(source, None, target, None, relation)
    }

    /// Link two endpoints; explicit kinds take precedence over inference
    pub fn add_link_with_kinds(
        &self,
        source: &str,
        source_kind: Option<NodeKind>,
        target: &str,
        target_kind: Option<NodeKind>,
        relation: Relation,
    ) -> Result<Link> {
        let source_kind = source_kind
            .or_else(|| infer_kind(source))
            .ok_or_else(|| unknown_kind(source))?;
        let source_record = source_kind.record_kind().ok_or_else(|| {
            PalaceError::Validation(format!("link source must be a record, got code '{}'", source))
        })?;
        self.require_record(source_record, source)?;

        let target_kind = target_kind
            .or_else(|| infer_kind(target))
            .ok_or_else(|| unknown_kind(target))?;
        let target_mtime = match target_kind.record_kind() {
            Some(kind) => {
                self.require_record(kind, target)?;
                None
            }
            None => Some(self.snapshot_code_target(target)?),
        };

        let duplicate: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM links WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3)",
            params![source, target, relation.as_str()],
            |row| row.get(0),
        )?;
        if duplicate {
            return Err(PalaceError::DuplicateLink(format!(
                "{} -{}-> {}",
                source, relation, target
            )));
        }

        let link = Link {
            id: new_id("k"),
            source_id: source.to_string(),
            source_kind,
            target_id: target.to_string(),
            target_kind,
            relation,
            target_mtime,
            created_at: storage::now(),
        };
        self.conn.execute(
            &format!(
                "INSERT INTO links ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                LINK_COLUMNS
            ),
            params![
                link.id,
                link.source_id,
                link.source_kind.as_str(),
                link.target_id,
                link.target_kind.as_str(),
                link.relation.as_str(),
                link.target_mtime,
                storage::ts(link.created_at),
            ],
        )?;

        debug!("Linked {} -{}-> {}", source, relation, target);
        Ok(link)
    }

    fn require_record(&self, kind: RecordKind, id: &str) -> Result<()> {
        if record_exists(&self.conn, kind, id)? {
            Ok(())
        } else {
            Err(PalaceError::not_found(kind.as_str(), id))
        }
    }

    fn code_path(&self, code_ref: &CodeRef) -> PathBuf {
        self.root.join(&code_ref.path)
    }

    fn snapshot_code_target(&self, target: &str) -> Result<i64> {
        let code_ref = CodeRef::parse(target)?;
        let path = self.code_path(&code_ref);
        match self.oracle.stat(&path) {
            Ok(FileState::Present { mtime }) => Ok(mtime),
            Ok(FileState::Missing) => Err(PalaceError::UnresolvableReference(format!(
                "{}: no such file under {}",
                target,
                self.root.display()
            ))),
            Err(e) => Err(PalaceError::UnresolvableReference(format!("{}: {}", target, e))),
        }
    }

    /// Links touching `id` on the requested side, oldest first
    pub fn links_for(&self, id: &str, direction: Direction) -> Result<Vec<Link>> {
        let filter = match direction {
            Direction::From => "source_id = ?1",
            Direction::To => "target_id = ?1",
            Direction::Both => "(source_id = ?1 OR target_id = ?1)",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM links WHERE {} ORDER BY created_at, id",
            LINK_COLUMNS, filter
        ))?;
        let rows = stmt.query_map(params![id], link_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_link(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM links WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(PalaceError::not_found("link", id));
        }
        Ok(())
    }

    /// Code links whose target is missing or changed since linking
    ///
    /// Oracle failures skip the link for this run.
    pub fn stale_links(&self) -> Result<Vec<StaleLink>> {
        let links: Vec<Link> = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM links WHERE target_kind = 'code' ORDER BY created_at, id",
                LINK_COLUMNS
            ))?;
            let rows = stmt.query_map([], link_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut stale = Vec::new();
        for link in links {
            let code_ref = match CodeRef::parse(&link.target_id) {
                Ok(code_ref) => code_ref,
                Err(e) => {
                    warn!("Skipping link {} with unparsable target: {}", link.id, e);
                    continue;
                }
            };
            let reason = match self.oracle.stat(&self.code_path(&code_ref)) {
                Ok(FileState::Missing) => Some(StaleReason::Missing),
                Ok(FileState::Present { mtime }) if Some(mtime) != link.target_mtime => {
                    Some(StaleReason::Modified {
                        snapshot: link.target_mtime,
                        current: mtime,
                    })
                }
                Ok(FileState::Present { .. }) => None,
                Err(e) => {
                    warn!("Could not check link {} ({}): {}", link.id, link.target_id, e);
                    None
                }
            };
            if let Some(reason) = reason {
                stale.push(StaleLink { link, reason });
            }
        }
        Ok(stale)
    }

    /// Ids of stale code links
    pub fn validate_links(&self) -> Result<Vec<String>> {
        Ok(self
            .stale_links()?
            .into_iter()
            .map(|s| s.link.id)
            .collect())
    }

    /// Delete every stale code link and return what was removed
    pub fn prune_stale_links(&self) -> Result<Vec<Link>> {
        let mut pruned = Vec::new();
        for stale in self.stale_links()? {
            match self.delete_link(&stale.link.id) {
                Ok(()) => pruned.push(stale.link),
                Err(e) => warn!("Failed to prune link {}: {}", stale.link.id, e),
            }
        }
        if !pruned.is_empty() {
            info!("Pruned {} stale links", pruned.len());
        }
        Ok(pruned)
    }
}

fn unknown_kind(endpoint: &str) -> PalaceError {
    PalaceError::Validation(format!(
        "cannot tell what '{}' refers to; pass its kind explicitly",
        endpoint
    ))
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_kind: enum_column(row, 2)?,
        target_id: row.get(3)?,
        target_kind: enum_column(row, 4)?,
        relation: enum_column(row, 5)?,
        target_mtime: row.get(6)?,
        created_at: ts_column(row, 7)?,
    })
}
