//! Palace - governed workspace memory with a cross-workspace corridor
//!
//! Each workspace keeps a small SQLite store under `.palace/` holding three
//! kinds of records:
//! - **Ideas**: exploratory notes, always written directly
//! - **Decisions**: choices with rationale and a tracked outcome
//! - **Learnings**: lessons with a confidence that is reinforced on use and
//!   decays with neglect
//!
//! Writes pass through a governance gate: free text is classified, and
//! decisions and learnings coming from agents become proposals that a human
//! approves or rejects. Records link to each other and to code locations;
//! code links remember the file's modification time so they can be reported
//! stale once the file changes.
//!
//! The [`corridor`] is a user-level store of personal learnings plus a
//! registry of linked workspaces (local directories or remote URLs), whose
//! shared learnings are fetched through an on-disk cache.
//!
//! # Example
//!
//! ```no_run
//! use palace_core::{Actor, StoreAction, StoreRequest, WorkspaceMemory};
//!
//! fn main() -> palace_core::Result<()> {
//!     let memory = WorkspaceMemory::open(".")?;
//!
//!     let result = memory.store(StoreRequest::new(
//!         "We decided to use JWT for service auth because sessions do not scale",
//!         Actor::agent("planner"),
//!     ))?;
//!
//!     if let StoreAction::Proposed(proposal) = result.action {
//!         memory.approve(&proposal.id, &Actor::human("ana"), Some("agreed"))?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod corridor;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod memory;
pub mod oracle;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use artifact::{SharedArtifact, SharedLearning};
pub use audit::{AuditEntry, AuditSink, RecordingAuditSink};
pub use classifier::{classify, extract_tags, Classification};
pub use config::{PalaceConfig, WORKSPACE_MARKER};
pub use corridor::{Corridor, FetchOptions, FetchResult, LinkedWorkspace, PersonalLearning};
pub use error::{PalaceError, Result};
pub use lifecycle::MaintenanceReport;
pub use memory::{RecordFilter, StoreAction, StoreRequest, StoreResult, WorkspaceMemory};
pub use oracle::{FileOracle, FileState, FsOracle};
pub use types::{
    Actor, Authority, Decision, DecisionOutcome, DecisionStatus, Direction, Idea, IdeaStatus,
    Learning, Link, NodeKind, Proposal, ProposalKind, ProposalStatus, Record, RecordKind,
    Relation, Scope,
};
