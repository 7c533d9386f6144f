//! Embedded SQL schemas
//!
//! Every statement is idempotent so the schema can be applied on each open.

/// Schema of a workspace store (`<root>/.palace/memory.db`)
pub const WORKSPACE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ideas (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    scope TEXT NOT NULL CHECK(scope IN ('palace', 'room', 'file')),
    scope_path TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK(status IN ('active', 'exploring', 'implemented', 'dropped')),
    context TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    scope TEXT NOT NULL CHECK(scope IN ('palace', 'room', 'file')),
    scope_path TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'proposed'
        CHECK(status IN ('proposed', 'superseded', 'reversed')),
    outcome TEXT NOT NULL DEFAULT 'unknown'
        CHECK(outcome IN ('unknown', 'successful', 'failed', 'mixed')),
    outcome_note TEXT,
    reviewed_at TEXT,
    rationale TEXT NOT NULL DEFAULT '',
    authority TEXT NOT NULL CHECK(authority IN ('approved', 'unreviewed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS learnings (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    scope TEXT NOT NULL CHECK(scope IN ('palace', 'room', 'file')),
    scope_path TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    confidence REAL NOT NULL CHECK(confidence BETWEEN 0.0 AND 1.0),
    use_count INTEGER NOT NULL DEFAULT 0 CHECK(use_count >= 0),
    last_used TEXT NOT NULL,
    last_decayed TEXT,
    authority TEXT NOT NULL CHECK(authority IN ('approved', 'unreviewed')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_learnings_last_used ON learnings(last_used);
CREATE INDEX IF NOT EXISTS idx_learnings_confidence ON learnings(confidence);

CREATE TABLE IF NOT EXISTS record_tags (
    record_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (record_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_record_tags_tag ON record_tags(tag);

CREATE TABLE IF NOT EXISTS proposals (
    id TEXT PRIMARY KEY NOT NULL,
    proposed_as TEXT NOT NULL CHECK(proposed_as IN ('decision', 'learning')),
    content TEXT NOT NULL,
    scope TEXT NOT NULL CHECK(scope IN ('palace', 'room', 'file')),
    scope_path TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    rationale TEXT,
    classification_confidence REAL NOT NULL
        CHECK(classification_confidence BETWEEN 0.0 AND 1.0),
    classification_signals TEXT NOT NULL DEFAULT '[]',
    dedupe_key TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending', 'approved', 'rejected', 'expired')),
    promoted_to_id TEXT,
    reviewed_by TEXT,
    review_note TEXT,
    reviewed_at TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_proposals_pending_dedupe
    ON proposals(dedupe_key) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status, created_at);

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY NOT NULL,
    source_id TEXT NOT NULL,
    source_kind TEXT NOT NULL CHECK(source_kind IN ('idea', 'decision', 'learning')),
    target_id TEXT NOT NULL,
    target_kind TEXT NOT NULL CHECK(target_kind IN ('idea', 'decision', 'learning', 'code')),
    relation TEXT NOT NULL CHECK(relation IN (
        'supersedes', 'implements', 'supports', 'contradicts', 'inspired-by', 'related'
    )),
    target_mtime INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE (source_id, target_id, relation)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action TEXT NOT NULL,
    actor_type TEXT NOT NULL CHECK(actor_type IN ('human', 'agent')),
    actor_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    target_kind TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    timestamp TEXT NOT NULL
);
"#;

/// Schema of the user-level corridor store
pub const CORRIDOR_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS personal_learnings (
    id TEXT PRIMARY KEY NOT NULL,
    origin_workspace TEXT NOT NULL,
    origin_id TEXT,
    content TEXT NOT NULL,
    confidence REAL NOT NULL CHECK(confidence BETWEEN 0.0 AND 1.0),
    source TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_used TEXT NOT NULL,
    last_decayed TEXT,
    use_count INTEGER NOT NULL DEFAULT 0 CHECK(use_count >= 0),
    tags TEXT NOT NULL DEFAULT '[]'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_personal_origin
    ON personal_learnings(origin_workspace, origin_id) WHERE origin_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_personal_last_used ON personal_learnings(last_used);

CREATE TABLE IF NOT EXISTS linked_workspaces (
    name TEXT PRIMARY KEY NOT NULL,
    path TEXT NOT NULL,
    added_at TEXT NOT NULL,
    last_accessed TEXT
);
"#;
