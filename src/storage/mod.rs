//! Storage layer for the palace memory system
//!
//! Both the workspace store and the corridor store are single SQLite files
//! accessed through rusqlite. This module owns connection setup, schema
//! creation and the conversions shared by every table mapper.

pub mod schema;

use crate::error::{PalaceError, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) a read-write database and apply `schema`
pub fn open(path: &Path, schema: &str) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!("Opening database: {}", path.display());
    let conn = Connection::open(path)?;
    configure(&conn)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!("Journal mode: {}", mode);
    migrate(&conn, schema)?;
    Ok(conn)
}

/// Open a private in-memory database with `schema` applied
pub fn open_in_memory(schema: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrate(&conn, schema)?;
    Ok(conn)
}

/// Open an existing database without write access
pub fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(PalaceError::not_found("database", path.display().to_string()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Create all tables and indexes; safe to run on every open
fn migrate(conn: &Connection, schema: &str) -> Result<()> {
    conn.execute_batch(schema)?;
    debug!("Schema applied");
    Ok(())
}

/// Persisted form of a timestamp
///
/// Fixed-width RFC 3339 in UTC with microseconds, so string comparison in
/// SQL matches chronological order.
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision timestamps are persisted with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PalaceError::Validation(format!("invalid timestamp '{}': {}", s, e)))
}

fn conversion_error(idx: usize, err: PalaceError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Read a timestamp column inside a row mapper
pub(crate) fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| conversion_error(idx, e))
}

/// Read an optional timestamp column inside a row mapper
pub(crate) fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_ts(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Read a string-backed enum column inside a row mapper
pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = PalaceError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

/// Read a JSON array of strings inside a row mapper
pub(crate) fn json_list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e.into()))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_round_trip_and_ordering() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert_eq!(parse_ts(&ts(a)).unwrap(), a);
        assert!(ts(a) < ts(b));
        assert!(parse_ts("yesterday").is_err());
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_open_creates_parent_and_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("memory.db");
        let conn = open(&path, schema::WORKSPACE_SCHEMA).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'proposals'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        // Reopening re-applies the schema without error
        drop(conn);
        assert!(open(&path, schema::WORKSPACE_SCHEMA).is_ok());
    }

    #[test]
    fn test_open_read_only_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let err = open_read_only(&temp.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, PalaceError::NotFound { .. }));
    }
}
