//! File existence and modification-time oracle
//!
//! The link graph and the corridor only ever look at the filesystem through
//! this trait, so staleness checks can be driven by a mock in tests.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// What the oracle knows about a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Missing,
    /// Modification time in nanoseconds since the Unix epoch
    Present { mtime: i64 },
}

#[cfg_attr(test, mockall::automock)]
pub trait FileOracle: Send {
    /// Look up a path; I/O failures other than "not found" are errors
    fn stat(&self, path: &Path) -> io::Result<FileState>;

    /// Whether the path exists; errors count as absent
    fn exists(&self, path: &Path) -> bool {
        matches!(self.stat(path), Ok(FileState::Present { .. }))
    }
}

/// Oracle backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOracle;

impl FileOracle for FsOracle {
    fn stat(&self, path: &Path) -> io::Result<FileState> {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let modified = meta.modified()?;
                let mtime = match modified.duration_since(UNIX_EPOCH) {
                    Ok(d) => d.as_nanos() as i64,
                    Err(e) => -(e.duration().as_nanos() as i64),
                };
                Ok(FileState::Present { mtime })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileState::Missing),
            Err(e) => Err(e),
        }
    }
}
