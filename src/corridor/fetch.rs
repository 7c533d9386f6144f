//! Fetching linked workspaces' learnings through the corridor cache
//!
//! Each link has a cache directory `cache/<name>/` holding the last good
//! artifact body (`artifact.json`) and its metadata (`meta.json`). The cache
//! is only ever replaced after a body has parsed, through temp-file renames
//! with the metadata written last. The metadata carries the SHA-256 of the
//! body it describes; a pair that does not match is treated as no cache.
//!
//! Remote links reuse a fresh cache unless a refresh is forced. Local links
//! are always read live. Whenever the live read fails and a cached copy
//! exists, the cached copy is served with a warning.

use super::registry::LinkedWorkspace;
use super::Corridor;
use crate::artifact::{self, shared_artifact_path, SharedArtifact, SharedLearning};
use crate::config::WORKSPACE_MARKER;
use crate::error::{PalaceError, Result};
use crate::memory::WorkspaceMemory;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::ETAG;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const ARTIFACT_FILE: &str = "artifact.json";
const META_FILE: &str = "meta.json";

/// Per-call fetch behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ignore a fresh cache and go to the source
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Learnings of one linked workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Link name
    pub workspace: String,
    pub learnings: Vec<SharedLearning>,
    pub from_cache: bool,
    /// Set when the source failed and the cache was served instead
    pub warning: Option<String>,
    /// When the served payload was obtained from the source
    pub fetched_at: DateTime<Utc>,
}

/// Metadata stored next to a cached artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    pub fetched_at: DateTime<Utc>,
    /// Validator token reported by the server; recorded, never sent back
    pub etag: Option<String>,
    pub source_url: String,
    pub ttl_secs: u64,
    /// SHA-256 of the cached artifact body
    pub body_sha256: String,
}

impl CacheMeta {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .unwrap_or(ChronoDuration::MAX);
        let age = now.signed_duration_since(self.fetched_at);
        age >= ChronoDuration::zero() && age < ttl
    }
}

/// A link that could not be served at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of fetching every link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkedFetchSummary {
    pub results: Vec<FetchResult>,
    pub failures: Vec<LinkFailure>,
}

struct CachedArtifact {
    meta: CacheMeta,
    artifact: SharedArtifact,
}

/// A successful read from the source
struct Fetched {
    artifact: SharedArtifact,
    body: Vec<u8>,
    etag: Option<String>,
}

impl Corridor {
    /// Learnings of one linked workspace, cache-aware
    pub fn get_linked_learnings(&self, name: &str, options: FetchOptions) -> Result<FetchResult> {
        let link = self.get_link(name)?;
        let now = Utc::now();
        let cached = self.read_cache(name);

        if link.is_remote() && !options.force_refresh {
            if let Some(cached) = &cached {
                if cached.meta.is_fresh(now) {
                    debug!("Serving fresh cache for {}", name);
                    return Ok(FetchResult {
                        workspace: link.name,
                        learnings: cached.artifact.learnings.clone(),
                        from_cache: true,
                        warning: None,
                        fetched_at: cached.meta.fetched_at,
                    });
                }
            }
        }

        let live = if link.is_remote() {
            self.fetch_remote(&link)
        } else {
            self.read_local(&link)
        };

        match live {
            Ok(fetched) => {
                let ttl = self.config.corridor.ttl_for(name);
                if let Err(e) = self.write_cache(&link, &fetched, now, ttl) {
                    warn!("Failed to update cache for {}: {}", name, e);
                }
                self.touch_link(name, now);
                info!(
                    "Fetched {} learnings from {}",
                    fetched.artifact.learnings.len(),
                    name
                );
                Ok(FetchResult {
                    workspace: link.name,
                    learnings: fetched.artifact.learnings,
                    from_cache: false,
                    warning: None,
                    fetched_at: now,
                })
            }
            Err(e) => match cached {
                Some(cached) => {
                    let warning = format!(
                        "source unavailable ({}); serving cached copy from {}",
                        e,
                        cached.meta.fetched_at.to_rfc3339()
                    );
                    warn!("{}: {}", name, warning);
                    Ok(FetchResult {
                        workspace: link.name,
                        learnings: cached.artifact.learnings,
                        from_cache: true,
                        warning: Some(warning),
                        fetched_at: cached.meta.fetched_at,
                    })
                }
                None => Err(PalaceError::Unavailable(format!(
                    "{}: {} (no cached copy)",
                    name, e
                ))),
            },
        }
    }

    /// Fetch every link; one failing link never aborts the rest
    pub fn get_all_linked_learnings(&self, options: FetchOptions) -> Result<LinkedFetchSummary> {
        let mut summary = LinkedFetchSummary::default();
        for link in self.list_links()? {
            match self.get_linked_learnings(&link.name, options) {
                Ok(result) => summary.results.push(result),
                Err(e) => {
                    warn!("Failed to fetch {}: {}", link.name, e);
                    summary.failures.push(LinkFailure {
                        name: link.name,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }

    fn fetch_remote(&self, link: &LinkedWorkspace) -> Result<Fetched> {
        let mut request = self.client.get(&link.path);
        if let Some(auth) = self.config.corridor.auth_for(&link.name) {
            request = auth.apply(request)?;
        }

        debug!("GET {}", link.path);
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PalaceError::Unavailable(format!(
                "{} returned HTTP {}",
                link.path, status
            )));
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes()?.to_vec();
        let artifact = SharedArtifact::from_slice(&body)?;

        Ok(Fetched {
            artifact,
            body,
            etag,
        })
    }

    fn read_local(&self, link: &LinkedWorkspace) -> Result<Fetched> {
        let dir = Path::new(&link.path);
        if !self.oracle.exists(&dir.join(WORKSPACE_MARKER)) {
            return Err(PalaceError::MissingWorkspaceMarker {
                path: dir.to_path_buf(),
                marker: WORKSPACE_MARKER.to_string(),
            });
        }

        let published = shared_artifact_path(dir);
        let artifact = if self.oracle.exists(&published) {
            SharedArtifact::read_from(&published)?
        } else {
            debug!("No published artifact in {}; exporting from its store", dir.display());
            WorkspaceMemory::open_read_only(dir)?
                .with_name(link.name.clone())
                .export_shareable(0.0)?
        };
        let body = serde_json::to_vec_pretty(&artifact)?;

        Ok(Fetched {
            artifact,
            body,
            etag: None,
        })
    }

    fn read_cache(&self, name: &str) -> Option<CachedArtifact> {
        let dir = self.cache_dir(name);
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return None;
        }

        let read = || -> Result<CachedArtifact> {
            let meta: CacheMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let body = fs::read(dir.join(ARTIFACT_FILE))?;
            if body_digest(&body) != meta.body_sha256 {
                return Err(PalaceError::Other(
                    "cached artifact does not match its metadata".to_string(),
                ));
            }
            let artifact = SharedArtifact::from_slice(&body)?;
            Ok(CachedArtifact { meta, artifact })
        };
        match read() {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Ignoring unreadable cache for {}: {}", name, e);
                None
            }
        }
    }

    fn write_cache(
        &self,
        link: &LinkedWorkspace,
        fetched: &Fetched,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<()> {
        let dir = self.cache_dir(&link.name);
        let meta = CacheMeta {
            fetched_at: now,
            etag: fetched.etag.clone(),
            source_url: link.path.clone(),
            ttl_secs: ttl.as_secs(),
            body_sha256: body_digest(&fetched.body),
        };
        artifact::write_atomic(&dir.join(ARTIFACT_FILE), &fetched.body)?;
        artifact::write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    /// Metadata of the cached copy for a link, if any
    pub fn cache_meta(&self, name: &str) -> Option<CacheMeta> {
        self.read_cache(name).map(|cached| cached.meta)
    }
}

fn body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}
