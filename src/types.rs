//! Core data types for the palace memory system
//!
//! This module defines the knowledge records (ideas, decisions, learnings),
//! the proposals that gate them, the links between them and the scopes and
//! actors every operation is attributed to.

use crate::error::{PalaceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of hex characters following an id prefix
pub const ID_SUFFIX_LEN: usize = 12;

/// Generate a new id with the given kind prefix (e.g. `d_3f9a0c1b2e4d`)
pub fn new_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..ID_SUFFIX_LEN])
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// persisted form is a fixed lowercase string.
macro_rules! string_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = PalaceError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(PalaceError::Validation(format!(
                        "invalid {}: '{}'",
                        $what, other
                    ))),
                }
            }
        }
    };
}

/// Kind of canonical knowledge record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Idea,
    Decision,
    Learning,
}

string_enum!(RecordKind, "record kind", {
    Idea => "idea",
    Decision => "decision",
    Learning => "learning",
});

impl RecordKind {
    /// Id prefix used for records of this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            RecordKind::Idea => "i",
            RecordKind::Decision => "d",
            RecordKind::Learning => "l",
        }
    }

    /// Table holding records of this kind
    pub(crate) fn table(&self) -> &'static str {
        match self {
            RecordKind::Idea => "ideas",
            RecordKind::Decision => "decisions",
            RecordKind::Learning => "learnings",
        }
    }
}

/// Visibility/relevance partition of a record
///
/// `Palace` covers the whole workspace, `Room` a named subdivision and
/// `File` a single path. Scope narrows relevance, never governance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "path")]
pub enum Scope {
    #[default]
    Palace,
    Room(String),
    File(String),
}

impl Scope {
    /// Build a scope from its persisted (kind, path) pair
    pub fn from_parts(kind: &str, path: &str) -> Result<Self> {
        let path = path.trim();
        match kind {
            "palace" => {
                if path.is_empty() {
                    Ok(Scope::Palace)
                } else {
                    Err(PalaceError::Validation(format!(
                        "palace scope takes no path (got '{}')",
                        path
                    )))
                }
            }
            "room" | "file" if path.is_empty() => Err(PalaceError::Validation(format!(
                "{} scope requires a path",
                kind
            ))),
            "room" => Ok(Scope::Room(path.to_string())),
            "file" => Ok(Scope::File(path.to_string())),
            other => Err(PalaceError::Validation(format!("invalid scope: '{}'", other))),
        }
    }

    /// Scope kind as persisted (`palace`, `room`, `file`)
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Palace => "palace",
            Scope::Room(_) => "room",
            Scope::File(_) => "file",
        }
    }

    /// Scope path; empty for palace scope
    pub fn path(&self) -> &str {
        match self {
            Scope::Palace => "",
            Scope::Room(p) | Scope::File(p) => p,
        }
    }

    /// Trimmed copy in the form it is persisted; blank room or file paths
    /// are rejected
    pub fn normalized(&self) -> Result<Self> {
        Self::from_parts(self.kind(), self.path())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Palace => write!(f, "palace"),
            Scope::Room(p) => write!(f, "room:{}", p),
            Scope::File(p) => write!(f, "file:{}", p),
        }
    }
}

/// Whether an actor is a person or an automated agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Human,
    Agent,
}

string_enum!(ActorType, "actor type", {
    Human => "human",
    Agent => "agent",
});

/// Who performed an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "id")]
pub enum Actor {
    Human(String),
    Agent(String),
}

impl Actor {
    pub fn human(id: impl Into<String>) -> Self {
        Actor::Human(id.into())
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Actor::Agent(id.into())
    }

    pub fn actor_type(&self) -> ActorType {
        match self {
            Actor::Human(_) => ActorType::Human,
            Actor::Agent(_) => ActorType::Agent,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Actor::Human(id) | Actor::Agent(id) => id,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Actor::Human(_))
    }

    /// Fail with `Forbidden` unless the actor is a human
    pub(crate) fn require_human(&self, operation: &str) -> Result<()> {
        if self.is_human() {
            Ok(())
        } else {
            Err(PalaceError::Forbidden(format!(
                "{} requires a human actor (got agent '{}')",
                operation,
                self.id()
            )))
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actor_type(), self.id())
    }
}

/// How a canonical record came to be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    /// Human-approved, either through a proposal or a direct write
    Approved,
    /// Written by an agent without review
    Unreviewed,
}

string_enum!(Authority, "authority", {
    Approved => "approved",
    Unreviewed => "unreviewed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    Active,
    Exploring,
    Implemented,
    Dropped,
}

string_enum!(IdeaStatus, "idea status", {
    Active => "active",
    Exploring => "exploring",
    Implemented => "implemented",
    Dropped => "dropped",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Proposed,
    Superseded,
    Reversed,
}

string_enum!(DecisionStatus, "decision status", {
    Proposed => "proposed",
    Superseded => "superseded",
    Reversed => "reversed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Unknown,
    Successful,
    Failed,
    Mixed,
}

string_enum!(DecisionOutcome, "decision outcome", {
    Unknown => "unknown",
    Successful => "successful",
    Failed => "failed",
    Mixed => "mixed",
});

/// Something speculative worth remembering; never gated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    pub content: String,
    pub scope: Scope,
    pub source: String,
    pub status: IdeaStatus,
    pub context: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A commitment the team made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub content: String,
    pub scope: Scope,
    pub source: String,
    pub status: DecisionStatus,
    pub outcome: DecisionOutcome,
    pub outcome_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rationale: String,
    pub authority: Authority,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A retrospective insight with a confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub id: String,
    pub content: String,
    pub scope: Scope,
    pub source: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub use_count: u32,
    pub last_used: DateTime<Utc>,
    pub authority: Authority,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Any canonical knowledge record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Record {
    Idea(Idea),
    Decision(Decision),
    Learning(Learning),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Record::Idea(r) => &r.id,
            Record::Decision(r) => &r.id,
            Record::Learning(r) => &r.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Idea(_) => RecordKind::Idea,
            Record::Decision(_) => RecordKind::Decision,
            Record::Learning(_) => RecordKind::Learning,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Record::Idea(r) => &r.content,
            Record::Decision(r) => &r.content,
            Record::Learning(r) => &r.content,
        }
    }

    pub fn scope(&self) -> &Scope {
        match self {
            Record::Idea(r) => &r.scope,
            Record::Decision(r) => &r.scope,
            Record::Learning(r) => &r.scope,
        }
    }
}

/// Record kinds that can be proposed for approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    Decision,
    Learning,
}

string_enum!(ProposalKind, "proposal kind", {
    Decision => "decision",
    Learning => "learning",
});

impl From<ProposalKind> for RecordKind {
    fn from(kind: ProposalKind) -> Self {
        match kind {
            ProposalKind::Decision => RecordKind::Decision,
            ProposalKind::Learning => RecordKind::Learning,
        }
    }
}

impl TryFrom<RecordKind> for ProposalKind {
    type Error = PalaceError;

    fn try_from(kind: RecordKind) -> Result<Self> {
        match kind {
            RecordKind::Decision => Ok(ProposalKind::Decision),
            RecordKind::Learning => Ok(ProposalKind::Learning),
            RecordKind::Idea => Err(PalaceError::Validation(
                "ideas are not governed and cannot be proposed".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

string_enum!(ProposalStatus, "proposal status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Expired => "expired",
});

/// A gated write awaiting human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposed_as: ProposalKind,
    pub content: String,
    pub scope: Scope,
    pub source: String,
    pub rationale: Option<String>,
    pub classification_confidence: f64,
    pub classification_signals: Vec<String>,
    pub dedupe_key: String,
    pub status: ProposalStatus,
    pub promoted_to_id: Option<String>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Kind of a link endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Idea,
    Decision,
    Learning,
    Code,
}

string_enum!(NodeKind, "link endpoint kind", {
    Idea => "idea",
    Decision => "decision",
    Learning => "learning",
    Code => "code",
});

impl NodeKind {
    /// The record kind behind this endpoint, if it is a record
    pub fn record_kind(&self) -> Option<RecordKind> {
        match self {
            NodeKind::Idea => Some(RecordKind::Idea),
            NodeKind::Decision => Some(RecordKind::Decision),
            NodeKind::Learning => Some(RecordKind::Learning),
            NodeKind::Code => None,
        }
    }
}

impl From<RecordKind> for NodeKind {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Idea => NodeKind::Idea,
            RecordKind::Decision => NodeKind::Decision,
            RecordKind::Learning => NodeKind::Learning,
        }
    }
}

/// Relationship carried by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    #[serde(rename = "supersedes")]
    Supersedes,
    #[serde(rename = "implements")]
    Implements,
    #[serde(rename = "supports")]
    Supports,
    #[serde(rename = "contradicts")]
    Contradicts,
    #[serde(rename = "inspired-by")]
    InspiredBy,
    #[serde(rename = "related")]
    Related,
}

string_enum!(Relation, "relation", {
    Supersedes => "supersedes",
    Implements => "implements",
    Supports => "supports",
    Contradicts => "contradicts",
    InspiredBy => "inspired-by",
    Related => "related",
});

/// Directed typed edge from a record to a record or code location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source_id: String,
    pub source_kind: NodeKind,
    pub target_id: String,
    pub target_kind: NodeKind,
    pub relation: Relation,
    /// Modification time (ns since the Unix epoch) snapshotted for code targets
    pub target_mtime: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Which side of a link to match when listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    From,
    To,
    Both,
}

string_enum!(Direction, "direction", {
    From => "from",
    To => "to",
    Both => "both",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_shape() {
        let id = new_id("d");
        assert!(id.starts_with("d_"));
        assert_eq!(id.len(), 2 + ID_SUFFIX_LEN);
        assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_id("d"), id);
    }

    #[test]
    fn test_scope_round_trip_and_validation() {
        let room = Scope::from_parts("room", "auth").unwrap();
        assert_eq!(room, Scope::Room("auth".to_string()));
        assert_eq!(room.kind(), "room");
        assert_eq!(room.path(), "auth");
        assert_eq!(room.to_string(), "room:auth");

        assert_eq!(Scope::from_parts("palace", "").unwrap(), Scope::Palace);
        assert!(Scope::from_parts("palace", "x").is_err());
        assert!(Scope::from_parts("file", "  ").is_err());
        assert!(Scope::from_parts("galaxy", "").is_err());
    }

    #[test]
    fn test_string_enums_parse() {
        assert_eq!("inspired-by".parse::<Relation>().unwrap(), Relation::InspiredBy);
        assert_eq!(Relation::InspiredBy.to_string(), "inspired-by");
        assert_eq!(
            "implemented".parse::<IdeaStatus>().unwrap(),
            IdeaStatus::Implemented
        );
        assert!("maybe".parse::<DecisionOutcome>().is_err());
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(PalaceError::Validation(_))
        ));
    }

    #[test]
    fn test_relation_serde_matches_display() {
        let json = serde_json::to_string(&Relation::InspiredBy).unwrap();
        assert_eq!(json, "\"inspired-by\"");
    }

    #[test]
    fn test_idea_cannot_be_proposed() {
        assert!(ProposalKind::try_from(RecordKind::Idea).is_err());
        assert_eq!(
            ProposalKind::try_from(RecordKind::Learning).unwrap(),
            ProposalKind::Learning
        );
    }

    #[test]
    fn test_actor() {
        let human = Actor::human("alice");
        assert!(human.require_human("approve").is_ok());
        let agent = Actor::agent("claude");
        assert!(matches!(
            agent.require_human("approve"),
            Err(PalaceError::Forbidden(_))
        ));
        assert_eq!(agent.to_string(), "agent:claude");
    }
}
