//! Corridor: knowledge shared across workspaces
//!
//! The corridor lives outside any single workspace (by default under
//! `~/.palace/corridor`) and holds three things:
//!
//! - personal learnings promoted out of workspaces, with the same
//!   reinforce/decay/prune lifecycle as workspace learnings
//! - a registry of linked workspaces, local directories or remote URLs
//!   ([`registry`])
//! - a per-link cache of each linked workspace's shared artifact
//!   ([`fetch`])

pub mod auth;
pub mod fetch;
pub mod registry;

use crate::artifact::SharedLearning;
use crate::classifier::extract_tags;
use crate::config::PalaceConfig;
use crate::error::{PalaceError, Result};
use crate::lifecycle::{self, LearningTable, MaintenanceReport};
use crate::memory::WorkspaceMemory;
use crate::oracle::{FileOracle, FsOracle};
use crate::storage::{self, json_list_column, schema::CORRIDOR_SCHEMA, ts_column};
use crate::types::{new_id, Learning};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub use fetch::{CacheMeta, FetchOptions, FetchResult, LinkFailure, LinkedFetchSummary};
pub use registry::LinkedWorkspace;

pub const CORRIDOR_DB: &str = "corridor.db";
pub const CACHE_DIR: &str = "cache";

const PERSONAL_COLUMNS: &str = "id, origin_workspace, origin_id, content, confidence, source, \
     created_at, last_used, use_count, tags";

/// A learning promoted out of a workspace into the corridor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalLearning {
    pub id: String,
    pub origin_workspace: String,
    /// Workspace learning this was copied from
    pub origin_id: Option<String>,
    pub content: String,
    pub confidence: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub use_count: u32,
    pub tags: Vec<String>,
}

/// A linked workspace's learning that matched a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedMatch {
    pub workspace: String,
    pub learning: SharedLearning,
    pub from_cache: bool,
}

/// Corridor-wide search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorridorSearch {
    pub personal: Vec<PersonalLearning>,
    pub linked: Vec<LinkedMatch>,
    /// Degraded or failed links, one message each
    pub warnings: Vec<String>,
}

/// Handle on the corridor store
pub struct Corridor {
    conn: Connection,
    root: PathBuf,
    config: PalaceConfig,
    oracle: Box<dyn FileOracle>,
    client: Client,
}

impl Corridor {
    /// Open (creating if needed) the corridor rooted at `root`
    pub fn open(root: impl AsRef<Path>, config: PalaceConfig) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(CACHE_DIR))?;
        let conn = storage::open(&root.join(CORRIDOR_DB), CORRIDOR_SCHEMA)?;

        let client = Client::builder()
            .timeout(config.corridor.fetch_timeout)
            .user_agent(concat!("palace/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("Corridor opened at {}", root.display());
        Ok(Self {
            conn,
            root,
            config,
            oracle: Box::new(FsOracle),
            client,
        })
    }

    /// Open at `corridor.root` from the config, or `~/.palace/corridor`
    pub fn open_default(config: PalaceConfig) -> Result<Self> {
        let root = config.corridor.resolve_root()?;
        Self::open(root, config)
    }

    /// Replace the oracle used for workspace-marker checks
    pub fn with_oracle(mut self, oracle: impl FileOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PalaceConfig {
        &self.config
    }

    // ---- personal learnings ----

    /// Add a learning that did not come from a workspace record
    pub fn add_personal_learning(
        &self,
        origin_workspace: &str,
        content: &str,
        confidence: f64,
        source: &str,
    ) -> Result<PersonalLearning> {
        self.insert_personal(origin_workspace, None, content, confidence, source, &[])
    }

    /// Copy a workspace learning into the corridor
    ///
    /// Promoting the same learning from the same workspace again returns the
    /// row created the first time.
    pub fn promote_from_workspace(
        &self,
        workspace: &str,
        learning: &Learning,
    ) -> Result<PersonalLearning> {
        if let Some(existing) = self.find_by_origin(workspace, &learning.id)? {
            debug!(
                "Learning {} from {} already promoted as {}",
                learning.id, workspace, existing.id
            );
            return Ok(existing);
        }
        let promoted = self.insert_personal(
            workspace,
            Some(&learning.id),
            &learning.content,
            learning.confidence,
            &learning.source,
            &learning.tags,
        )?;
        info!(
            "Promoted learning {} from {} as {}",
            learning.id, workspace, promoted.id
        );
        Ok(promoted)
    }

    /// Promote every sufficiently confident, sufficiently used learning
    ///
    /// `workspace` must be a linked name. Returns only the learnings promoted
    /// by this call.
    pub fn auto_promote(
        &self,
        workspace: &str,
        memory: &WorkspaceMemory,
    ) -> Result<Vec<PersonalLearning>> {
        self.get_link(workspace)?;
        let min_confidence = self.config.corridor.auto_promote_min_confidence;
        let min_uses = self.config.corridor.auto_promote_min_uses;

        let mut promoted = Vec::new();
        for learning in memory.list_learnings()? {
            if learning.confidence < min_confidence || learning.use_count < min_uses {
                continue;
            }
            if self.find_by_origin(workspace, &learning.id)?.is_some() {
                continue;
            }
            promoted.push(self.promote_from_workspace(workspace, &learning)?);
        }
        if !promoted.is_empty() {
            info!("Auto-promoted {} learnings from {}", promoted.len(), workspace);
        }
        Ok(promoted)
    }

    fn insert_personal(
        &self,
        origin_workspace: &str,
        origin_id: Option<&str>,
        content: &str,
        confidence: f64,
        source: &str,
        extra_tags: &[String],
    ) -> Result<PersonalLearning> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PalaceError::Validation("content must not be empty".to_string()));
        }
        let confidence = lifecycle::validate_confidence(confidence)?;

        let mut tags = extract_tags(content);
        for tag in extra_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let now = storage::now();
        let learning = PersonalLearning {
            id: new_id("pl"),
            origin_workspace: origin_workspace.to_string(),
            origin_id: origin_id.map(str::to_string),
            content: content.to_string(),
            confidence,
            source: source.to_string(),
            created_at: now,
            last_used: now,
            use_count: 0,
            tags,
        };
        self.conn.execute(
            &format!(
                "INSERT INTO personal_learnings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0, ?8)",
                PERSONAL_COLUMNS
            ),
            params![
                learning.id,
                learning.origin_workspace,
                learning.origin_id,
                learning.content,
                learning.confidence,
                learning.source,
                storage::ts(now),
                serde_json::to_string(&learning.tags)?,
            ],
        )?;
        Ok(learning)
    }

    fn find_by_origin(&self, workspace: &str, origin_id: &str) -> Result<Option<PersonalLearning>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM personal_learnings WHERE origin_workspace = ?1 AND origin_id = ?2",
                    PERSONAL_COLUMNS
                ),
                params![workspace, origin_id],
                personal_from_row,
            )
            .optional()?)
    }

    pub fn get_personal_learning(&self, id: &str) -> Result<PersonalLearning> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM personal_learnings WHERE id = ?1", PERSONAL_COLUMNS),
                params![id],
                personal_from_row,
            )
            .optional()?
            .ok_or_else(|| PalaceError::not_found("personal learning", id))
    }

    /// Personal learnings, most confident first
    pub fn list_personal_learnings(&self, limit: Option<usize>) -> Result<Vec<PersonalLearning>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM personal_learnings ORDER BY confidence DESC, last_used DESC LIMIT ?1",
            PERSONAL_COLUMNS
        ))?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![limit], personal_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Case-insensitive substring search over personal learnings
    pub fn search_personal(&self, query: &str, limit: usize) -> Result<Vec<PersonalLearning>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM personal_learnings WHERE content LIKE ?1 ESCAPE '\\'
             ORDER BY confidence DESC LIMIT ?2",
            PERSONAL_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![storage::like_pattern(query), limit as i64],
            personal_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn reinforce_personal(&self, id: &str) -> Result<PersonalLearning> {
        lifecycle::reinforce(&self.conn, LearningTable::Personal, id, storage::now())?;
        self.get_personal_learning(id)
    }

    pub fn delete_personal(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM personal_learnings WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(PalaceError::not_found("personal learning", id));
        }
        Ok(())
    }

    pub fn decay_personal(&self, older_than_days: i64, delta: f64) -> Result<usize> {
        self.decay_personal_as_of(Utc::now(), older_than_days, delta)
    }

    pub fn decay_personal_as_of(
        &self,
        now: DateTime<Utc>,
        older_than_days: i64,
        delta: f64,
    ) -> Result<usize> {
        Ok(lifecycle::decay(&self.conn, LearningTable::Personal, now, older_than_days, delta)?.affected)
    }

    pub fn prune_personal(&self, floor: f64) -> Result<usize> {
        let outcome = lifecycle::prune(&self.conn, LearningTable::Personal, floor, |_, _| Ok(()))?;
        Ok(outcome.removed.len())
    }

    /// Decay then prune personal learnings with the configured defaults
    pub fn run_maintenance_as_of(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let start = Instant::now();
        let settings = &self.config.lifecycle;
        let decayed = lifecycle::decay(
            &self.conn,
            LearningTable::Personal,
            now,
            settings.decay_after_days,
            settings.decay_delta,
        )?;
        let pruned = lifecycle::prune(
            &self.conn,
            LearningTable::Personal,
            settings.confidence_floor,
            |_, _| Ok(()),
        )?;
        Ok(MaintenanceReport {
            decayed: decayed.affected,
            pruned: pruned.removed.len(),
            proposals_expired: 0,
            errors: decayed.errors + pruned.errors,
            duration: start.elapsed(),
        })
    }

    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.run_maintenance_as_of(Utc::now())
    }

    // ---- search ----

    /// Search personal learnings and every linked workspace
    ///
    /// Links that cannot be read contribute a warning instead of failing the
    /// search.
    pub fn search(&self, query: &str, limit: usize) -> Result<CorridorSearch> {
        let mut results = CorridorSearch {
            personal: self.search_personal(query, limit)?,
            ..Default::default()
        };

        let needle = query.to_lowercase();
        let summary = self.get_all_linked_learnings(FetchOptions::default())?;
        for fetched in summary.results {
            if let Some(warning) = &fetched.warning {
                results.warnings.push(format!("{}: {}", fetched.workspace, warning));
            }
            for learning in fetched.learnings {
                if results.linked.len() >= limit {
                    break;
                }
                if learning.content.to_lowercase().contains(&needle) {
                    results.linked.push(LinkedMatch {
                        workspace: fetched.workspace.clone(),
                        learning,
                        from_cache: fetched.from_cache,
                    });
                }
            }
        }
        for failure in summary.failures {
            warn!("Search skipped {}: {}", failure.name, failure.error);
            results
                .warnings
                .push(format!("{}: {}", failure.name, failure.error));
        }
        Ok(results)
    }

    pub(crate) fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(CACHE_DIR).join(name)
    }
}

fn personal_from_row(row: &Row<'_>) -> rusqlite::Result<PersonalLearning> {
    Ok(PersonalLearning {
        id: row.get(0)?,
        origin_workspace: row.get(1)?,
        origin_id: row.get(2)?,
        content: row.get(3)?,
        confidence: row.get(4)?,
        source: row.get(5)?,
        created_at: ts_column(row, 6)?,
        last_used: ts_column(row, 7)?,
        use_count: row.get(8)?,
        tags: json_list_column(row, 9)?,
    })
}
