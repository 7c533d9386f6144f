//! Tracing subscriber setup for embedding applications

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber filtered to this crate at `level`.
///
/// `RUST_LOG`, when set, takes precedence. Returns `false` if a global
/// subscriber was already installed.
pub fn init(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "palace_core={},rusqlite=warn,reqwest=warn",
            level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Logs go to stderr, not stdout
        .try_init()
        .is_ok()
}
