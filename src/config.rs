//! Configuration for governance, lifecycle maintenance and the corridor
//!
//! Settings live in `<workspace>/.palace/config.toml`. Every section is
//! optional; missing values fall back to the defaults below.

use crate::corridor::auth::AuthConfig;
use crate::types::RecordKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory marking a workspace root
pub const WORKSPACE_MARKER: &str = ".palace";

/// Config file name inside the workspace marker directory
pub const CONFIG_FILE: &str = "config.toml";

/// Longest day-count window accepted anywhere (about a century)
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Longest cache TTL accepted, in seconds
pub const MAX_CACHE_TTL_SECS: u64 = MAX_WINDOW_DAYS as u64 * 86_400;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalaceConfig {
    pub governance: GovernanceConfig,
    pub lifecycle: LifecycleConfig,
    pub corridor: CorridorConfig,
}

/// Proposal workflow settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Record kinds that require approval unless a human writes directly
    pub gated_kinds: Vec<RecordKind>,

    /// Classifications below this confidence are flagged for confirmation
    pub confirmation_threshold: f64,

    /// Pending proposals older than this become expired
    pub proposal_expiry_days: i64,

    /// Confidence floor given to learnings materialized from proposals
    pub default_learning_confidence: f64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            gated_kinds: vec![RecordKind::Decision, RecordKind::Learning],
            confirmation_threshold: 0.5,
            proposal_expiry_days: 14,
            default_learning_confidence: 0.5,
        }
    }
}

/// Decay and prune defaults used by the maintenance pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub decay_after_days: i64,
    pub decay_delta: f64,
    pub confidence_floor: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            decay_after_days: 30,
            decay_delta: 0.1,
            confidence_floor: 0.1,
        }
    }
}

/// Cross-workspace corridor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorridorConfig {
    /// Storage root; defaults to `~/.palace/corridor`
    pub root: Option<PathBuf>,

    /// How long a cached linked-workspace artifact stays fresh (seconds)
    #[serde(with = "serde_duration")]
    pub cache_ttl: Duration,

    /// Upper bound for a single remote fetch (seconds)
    #[serde(with = "serde_duration")]
    pub fetch_timeout: Duration,

    pub auto_promote_min_confidence: f64,
    pub auto_promote_min_uses: u32,

    /// Per-link overrides keyed by link name
    pub links: BTreeMap<String, LinkSettings>,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            root: None,
            cache_ttl: Duration::from_secs(86400), // 24 hours
            fetch_timeout: Duration::from_secs(30),
            auto_promote_min_confidence: 0.8,
            auto_promote_min_uses: 3,
            links: BTreeMap::new(),
        }
    }
}

impl CorridorConfig {
    /// Resolve the storage root, falling back to the user-level default
    pub fn resolve_root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(WORKSPACE_MARKER).join("corridor"))
            .ok_or_else(|| {
                ConfigError::ValidationError("cannot determine home directory".to_string())
            })
    }

    /// Effective TTL for a link
    pub fn ttl_for(&self, link: &str) -> Duration {
        self.links
            .get(link)
            .and_then(|s| s.cache_ttl_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.cache_ttl)
    }

    /// Auth settings for a link, if any
    pub fn auth_for(&self, link: &str) -> Option<&AuthConfig> {
        self.links.get(link).and_then(|s| s.auth.as_ref())
    }
}

/// Settings for a single linked workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    pub cache_ttl_secs: Option<u64>,
    pub auth: Option<AuthConfig>,
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between 0.0 and 1.0 (got {})",
            name, value
        )));
    }
    Ok(())
}

fn check_days(name: &str, days: i64, min: i64) -> Result<(), ConfigError> {
    if !(min..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between {} and {} days (got {})",
            name, min, MAX_WINDOW_DAYS, days
        )));
    }
    Ok(())
}

fn check_ttl(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_CACHE_TTL_SECS {
        return Err(ConfigError::ValidationError(format!(
            "{} must be at most {} seconds (got {})",
            name, MAX_CACHE_TTL_SECS, secs
        )));
    }
    Ok(())
}

impl PalaceConfig {
    /// Load configuration for a workspace root
    ///
    /// Reads `<root>/.palace/config.toml` when it exists, otherwise returns
    /// the defaults.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        let path = workspace_root.join(WORKSPACE_MARKER).join(CONFIG_FILE);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: PalaceConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gov = &self.governance;
        if gov.gated_kinds.contains(&RecordKind::Idea) {
            return Err(ConfigError::ValidationError(
                "governance.gated_kinds: ideas are never gated".to_string(),
            ));
        }
        check_unit(
            "governance.confirmation_threshold",
            gov.confirmation_threshold,
        )?;
        check_unit(
            "governance.default_learning_confidence",
            gov.default_learning_confidence,
        )?;
        check_days("governance.proposal_expiry_days", gov.proposal_expiry_days, 1)?;

        let life = &self.lifecycle;
        check_days("lifecycle.decay_after_days", life.decay_after_days, 0)?;
        check_unit("lifecycle.decay_delta", life.decay_delta)?;
        check_unit("lifecycle.confidence_floor", life.confidence_floor)?;

        let corridor = &self.corridor;
        check_unit(
            "corridor.auto_promote_min_confidence",
            corridor.auto_promote_min_confidence,
        )?;
        if corridor.fetch_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "corridor.fetch_timeout must be at least 1 second".to_string(),
            ));
        }
        check_ttl("corridor.cache_ttl", corridor.cache_ttl.as_secs())?;
        for (name, settings) in &corridor.links {
            if let Some(ttl) = settings.cache_ttl_secs {
                check_ttl(&format!("corridor.links.{}.cache_ttl_secs", name), ttl)?;
            }
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
