//! Linked workspace registry
//!
//! A link is a name plus either a local directory (which must carry the
//! `.palace` marker) or an `http(s)://` URL serving a shared artifact.

use super::Corridor;
use crate::config::WORKSPACE_MARKER;
use crate::error::{PalaceError, Result};
use crate::storage::{self, opt_ts_column, ts_column};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static LINK_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid link name pattern"));

/// A workspace registered with the corridor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedWorkspace {
    pub name: String,
    /// Absolute local path or remote URL
    pub path: String,
    pub added_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl LinkedWorkspace {
    pub fn is_remote(&self) -> bool {
        is_remote(&self.path)
    }

    /// Local directory of a non-remote link
    pub fn local_path(&self) -> Option<&Path> {
        (!self.is_remote()).then(|| Path::new(&self.path))
    }
}

pub(crate) fn is_remote(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

fn validate_name(name: &str) -> Result<()> {
    if LINK_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(PalaceError::Validation(format!(
            "invalid link name '{}': use letters, digits, '.', '_' or '-'",
            name
        )))
    }
}

impl Corridor {
    /// Register a workspace under `name`
    ///
    /// Local paths must contain the workspace marker. Remote URLs are not
    /// checked until fetched.
    pub fn link(&self, name: &str, path: &str) -> Result<LinkedWorkspace> {
        validate_name(name)?;
        let location = if is_remote(path) {
            path.to_string()
        } else {
            self.local_location(path)?
        };

        if self.find_link(name)?.is_some() {
            return Err(PalaceError::AlreadyLinked(name.to_string()));
        }

        let linked = LinkedWorkspace {
            name: name.to_string(),
            path: location,
            added_at: storage::now(),
            last_accessed: None,
        };
        self.conn.execute(
            "INSERT INTO linked_workspaces (name, path, added_at, last_accessed) VALUES (?1, ?2, ?3, NULL)",
            params![linked.name, linked.path, storage::ts(linked.added_at)],
        )?;
        info!("Linked workspace {} -> {}", linked.name, linked.path);
        Ok(linked)
    }

    fn local_location(&self, path: &str) -> Result<String> {
        let dir = PathBuf::from(path);
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        if !self.oracle.exists(&dir.join(WORKSPACE_MARKER)) {
            return Err(PalaceError::MissingWorkspaceMarker {
                path: dir,
                marker: WORKSPACE_MARKER.to_string(),
            });
        }
        Ok(dir.to_string_lossy().into_owned())
    }

    /// Remove a link and its cached artifact
    pub fn unlink(&self, name: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM linked_workspaces WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(PalaceError::NotLinked(name.to_string()));
        }
        self.remove_cache(name);
        info!("Unlinked workspace {}", name);
        Ok(())
    }

    pub fn list_links(&self) -> Result<Vec<LinkedWorkspace>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, path, added_at, last_accessed FROM linked_workspaces ORDER BY name",
        )?;
        let rows = stmt.query_map([], linked_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_link(&self, name: &str) -> Result<LinkedWorkspace> {
        self.find_link(name)?
            .ok_or_else(|| PalaceError::NotLinked(name.to_string()))
    }

    fn find_link(&self, name: &str) -> Result<Option<LinkedWorkspace>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name, path, added_at, last_accessed FROM linked_workspaces WHERE name = ?1",
                params![name],
                linked_from_row,
            )
            .optional()?)
    }

    /// Local links whose directory no longer carries the marker
    pub fn validate_links(&self) -> Result<Vec<LinkedWorkspace>> {
        Ok(self
            .list_links()?
            .into_iter()
            .filter(|link| match link.local_path() {
                Some(dir) => !self.oracle.exists(&dir.join(WORKSPACE_MARKER)),
                None => false,
            })
            .collect())
    }

    /// Unlink every stale local link; returns what was removed
    pub fn prune_stale_links(&self) -> Result<Vec<LinkedWorkspace>> {
        let mut pruned = Vec::new();
        for link in self.validate_links()? {
            match self.unlink(&link.name) {
                Ok(()) => pruned.push(link),
                Err(e) => warn!("Failed to prune link {}: {}", link.name, e),
            }
        }
        Ok(pruned)
    }

    pub(crate) fn touch_link(&self, name: &str, at: DateTime<Utc>) {
        if let Err(e) = self.conn.execute(
            "UPDATE linked_workspaces SET last_accessed = ?1 WHERE name = ?2",
            params![storage::ts(at), name],
        ) {
            warn!("Failed to record access to {}: {}", name, e);
        }
    }

    fn remove_cache(&self, name: &str) {
        let dir = self.cache_dir(name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove cache {}: {}", dir.display(), e),
        }
    }
}

fn linked_from_row(row: &Row<'_>) -> rusqlite::Result<LinkedWorkspace> {
    Ok(LinkedWorkspace {
        name: row.get(0)?,
        path: row.get(1)?,
        added_at: ts_column(row, 2)?,
        last_accessed: opt_ts_column(row, 3)?,
    })
}
