//! Common test utilities and helpers

#![allow(dead_code)]

use palace_core::{
    Actor, Corridor, PalaceConfig, Proposal, Record, RecordingAuditSink, StoreAction,
    StoreRequest, WorkspaceMemory, WORKSPACE_MARKER,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A workspace directory with the marker and an open store
pub struct TestWorkspace {
    pub dir: TempDir,
    pub memory: WorkspaceMemory,
    pub audit: RecordingAuditSink,
}

impl TestWorkspace {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the workspace root
    pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }
}

/// Create a temporary workspace with default configuration
pub fn create_test_workspace() -> TestWorkspace {
    create_test_workspace_with(PalaceConfig::default())
}

pub fn create_test_workspace_with(config: PalaceConfig) -> TestWorkspace {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let audit = RecordingAuditSink::new();
    let memory = WorkspaceMemory::open_with_config(dir.path(), config)
        .expect("Failed to open workspace memory")
        .with_audit_sink(audit.clone());
    assert!(dir.path().join(WORKSPACE_MARKER).is_dir());
    TestWorkspace { dir, memory, audit }
}

/// Create a corridor rooted in its own temporary directory
pub fn create_test_corridor(config: PalaceConfig) -> (TempDir, Corridor) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let corridor =
        Corridor::open(dir.path().join("corridor"), config).expect("Failed to open corridor");
    (dir, corridor)
}

pub fn human() -> Actor {
    Actor::human("ana")
}

pub fn agent() -> Actor {
    Actor::agent("planner")
}

/// Store text as an agent and return the resulting proposal
pub fn propose(memory: &WorkspaceMemory, content: &str) -> Proposal {
    match memory
        .store(StoreRequest::new(content, agent()))
        .expect("store failed")
        .action
    {
        StoreAction::Proposed(proposal) => proposal,
        StoreAction::Written(record) => panic!("expected a proposal, got {:?}", record),
    }
}

/// Store text as a human with a direct write
pub fn write_direct(memory: &WorkspaceMemory, request: StoreRequest) -> Record {
    match memory.store(request.direct()).expect("store failed").action {
        StoreAction::Written(record) => record,
        StoreAction::Proposed(proposal) => panic!("expected a record, got {:?}", proposal),
    }
}

/// URL on a local port with nothing listening
pub fn closed_port_url(path: &str) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind port");
    let port = listener.local_addr().expect("No local address").port();
    drop(listener);
    format!("http://127.0.0.1:{}{}", port, path)
}

/// Copy one link's cached artifact between corridors
pub fn copy_cache(from: &Corridor, to: &Corridor, name: &str) {
    let src = from.root().join("cache").join(name);
    let dst = to.root().join("cache").join(name);
    fs::create_dir_all(&dst).expect("Failed to create cache dir");
    for file in ["artifact.json", "meta.json"] {
        fs::copy(src.join(file), dst.join(file)).expect("Failed to copy cache file");
    }
}
