//! Error types for the palace memory system
//!
//! This module provides structured error definitions using thiserror, with
//! anyhow accepted at the edges. Every variant maps onto one of the broad
//! categories callers act on (see [`ErrorCategory`]).

use crate::config::ConfigError;
use crate::types::ProposalStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for palace operations
#[derive(Error, Debug)]
pub enum PalaceError {
    /// Malformed scope, kind, confidence, relation or other input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires a human actor
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Code reference could not be resolved against the workspace
    #[error("Unresolvable reference: {0}")]
    UnresolvableReference(String),

    /// Linked directory does not carry the workspace marker
    #[error("No workspace marker '{marker}' under {}", path.display())]
    MissingWorkspaceMarker { path: PathBuf, marker: String },

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A pending proposal with the same dedupe key already exists
    #[error("Duplicate proposal: pending proposal {existing_id} already covers this content")]
    DuplicateProposal { existing_id: String },

    /// Proposal is no longer pending
    #[error("Proposal {id} is already {status}")]
    AlreadyResolved { id: String, status: ProposalStatus },

    /// Link between the same records with the same relation already exists
    #[error("Link already exists: {0}")]
    DuplicateLink(String),

    /// Workspace name already registered in the corridor
    #[error("Workspace already linked: {0}")]
    AlreadyLinked(String),

    /// Workspace name not registered in the corridor
    #[error("Workspace not linked: {0}")]
    NotLinked(String),

    /// Corridor source unreachable and nothing cached
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Broad error categories callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

impl PalaceError {
    /// Shorthand for a not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        PalaceError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            PalaceError::Validation(_)
            | PalaceError::Forbidden(_)
            | PalaceError::UnresolvableReference(_)
            | PalaceError::MissingWorkspaceMarker { .. } => ErrorCategory::Validation,
            PalaceError::NotFound { .. } => ErrorCategory::NotFound,
            PalaceError::DuplicateProposal { .. }
            | PalaceError::AlreadyResolved { .. }
            | PalaceError::DuplicateLink(_)
            | PalaceError::AlreadyLinked(_)
            | PalaceError::NotLinked(_) => ErrorCategory::Conflict,
            PalaceError::Unavailable(_) => ErrorCategory::Unavailable,
            PalaceError::Database(_)
            | PalaceError::Io(_)
            | PalaceError::Serialization(_)
            | PalaceError::Http(_)
            | PalaceError::Config(_)
            | PalaceError::Other(_) => ErrorCategory::Internal,
        }
    }
}

/// Result type alias for palace operations
pub type Result<T> = std::result::Result<T, PalaceError>;

/// Convert anyhow::Error to PalaceError
impl From<anyhow::Error> for PalaceError {
    fn from(err: anyhow::Error) -> Self {
        PalaceError::Other(err.to_string())
    }
}
