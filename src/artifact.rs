//! Shareable learnings artifact
//!
//! The JSON document a workspace publishes for its peers, either as a file
//! at `.palace/outputs/shared-learnings.json` or as the body served at a
//! remote URL.

use crate::config::WORKSPACE_MARKER;
use crate::error::{PalaceError, Result};
use crate::types::{Learning, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Exported learnings of one workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedArtifact {
    pub version: u32,
    pub workspace: String,
    pub exported_at: DateTime<Utc>,
    pub learnings: Vec<SharedLearning>,
}

/// One learning as seen by other workspaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedLearning {
    pub id: String,
    pub content: String,
    pub confidence: f64,
    #[serde(default)]
    pub use_count: u32,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Learning> for SharedLearning {
    fn from(learning: &Learning) -> Self {
        Self {
            id: learning.id.clone(),
            content: learning.content.clone(),
            confidence: learning.confidence,
            use_count: learning.use_count,
            scope: learning.scope.clone(),
            tags: learning.tags.clone(),
            created_at: learning.created_at,
        }
    }
}

impl SharedArtifact {
    pub fn new(workspace: impl Into<String>, learnings: Vec<SharedLearning>) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            workspace: workspace.into(),
            exported_at: Utc::now(),
            learnings,
        }
    }

    /// Parse and sanity-check an artifact body
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let artifact: SharedArtifact = serde_json::from_slice(bytes)?;
        if artifact.version > ARTIFACT_VERSION {
            return Err(PalaceError::Validation(format!(
                "unsupported artifact version {} (newest known is {})",
                artifact.version, ARTIFACT_VERSION
            )));
        }
        if let Some(bad) = artifact
            .learnings
            .iter()
            .find(|l| !(0.0..=1.0).contains(&l.confidence))
        {
            return Err(PalaceError::Validation(format!(
                "learning {} has confidence {} outside [0, 1]",
                bad.id, bad.confidence
            )));
        }
        Ok(artifact)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &body)
    }
}

/// Where a workspace publishes its artifact
pub fn shared_artifact_path(workspace_root: &Path) -> PathBuf {
    workspace_root
        .join(WORKSPACE_MARKER)
        .join("outputs")
        .join("shared-learnings.json")
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
