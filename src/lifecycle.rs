// Confidence Lifecycle
//
// Reinforcement, decay and eviction shared by workspace learnings and
// corridor personal learnings. Both tables carry the same columns
// (confidence, use_count, last_used, last_decayed), so the statements are
// written once against a table name.
//
// Decay touches a row at most once per `older_than_days` window: a row is
// eligible when it was last used before the cutoff and has not been decayed
// since the cutoff. Re-running a pass therefore changes nothing.

use crate::config::MAX_WINDOW_DAYS;
use crate::error::{PalaceError, Result};
use crate::storage;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Tables holding confidence-scored learnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LearningTable {
    Workspace,
    Personal,
}

impl LearningTable {
    fn name(&self) -> &'static str {
        match self {
            LearningTable::Workspace => "learnings",
            LearningTable::Personal => "personal_learnings",
        }
    }

    fn entity(&self) -> &'static str {
        match self {
            LearningTable::Workspace => "learning",
            LearningTable::Personal => "personal learning",
        }
    }
}

/// Counts returned by a decay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayOutcome {
    pub affected: usize,
    pub errors: usize,
}

/// Ids removed by a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOutcome {
    pub removed: Vec<String>,
    pub errors: usize,
}

/// Result of one maintenance pass (decay, prune, proposal expiry)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub decayed: usize,
    pub pruned: usize,
    pub proposals_expired: usize,
    /// Records that failed and were left in their prior state
    pub errors: usize,
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,
}

mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `now` minus `days`, rejecting windows chrono cannot represent
pub(crate) fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    ChronoDuration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            PalaceError::Validation(format!("window of {} days is out of range", days))
        })
}

pub(crate) fn validate_decay(older_than_days: i64, delta: f64) -> Result<()> {
    if !(0..=MAX_WINDOW_DAYS).contains(&older_than_days) {
        return Err(PalaceError::Validation(format!(
            "decay threshold must be between 0 and {} days (got {})",
            MAX_WINDOW_DAYS, older_than_days
        )));
    }
    if !delta.is_finite() || delta < 0.0 {
        return Err(PalaceError::Validation(format!(
            "decay delta must be a non-negative number (got {})",
            delta
        )));
    }
    Ok(())
}

pub(crate) fn validate_floor(floor: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&floor) {
        return Err(PalaceError::Validation(format!(
            "confidence floor must be between 0.0 and 1.0 (got {})",
            floor
        )));
    }
    Ok(())
}

/// Validate a caller-supplied confidence
pub fn validate_confidence(confidence: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(PalaceError::Validation(format!(
            "confidence must be between 0.0 and 1.0 (got {})",
            confidence
        )));
    }
    Ok(confidence)
}

/// Count a use: bump use_count and refresh last_used. Confidence is untouched.
pub(crate) fn reinforce(
    conn: &Connection,
    table: LearningTable,
    id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = format!(
        "UPDATE {} SET use_count = use_count + 1, last_used = ?1 WHERE id = ?2",
        table.name()
    );
    let updated = conn.execute(&sql, params![storage::ts(now), id])?;
    if updated == 0 {
        return Err(PalaceError::not_found(table.entity(), id));
    }
    Ok(())
}

/// Lower confidence by `delta` on rows unused for `older_than_days`
pub(crate) fn decay(
    conn: &Connection,
    table: LearningTable,
    now: DateTime<Utc>,
    older_than_days: i64,
    delta: f64,
) -> Result<DecayOutcome> {
    validate_decay(older_than_days, delta)?;
    let cutoff = storage::ts(days_before(now, older_than_days)?);

    let select = format!(
        "SELECT id, confidence FROM {} \
         WHERE last_used < ?1 AND (last_decayed IS NULL OR last_decayed < ?1)",
        table.name()
    );
    let candidates: Vec<(String, f64)> = {
        let mut stmt = conn.prepare(&select)?;
        let rows = stmt.query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let update = format!(
        "UPDATE {} SET confidence = ?1, last_decayed = ?2 WHERE id = ?3",
        table.name()
    );
    let stamp = storage::ts(now);
    let mut outcome = DecayOutcome::default();
    for (id, confidence) in candidates {
        let decayed = (confidence - delta).clamp(0.0, 1.0);
        match conn.execute(&update, params![decayed, stamp, id]) {
            Ok(_) => {
                outcome.affected += 1;
                debug!("Decayed {} {}: {:.3} -> {:.3}", table.entity(), id, confidence, decayed);
            }
            Err(e) => {
                outcome.errors += 1;
                warn!("Failed to decay {} {}: {}", table.entity(), id, e);
            }
        }
    }

    Ok(outcome)
}

/// Remove rows whose confidence fell below `floor`
///
/// `on_remove` runs inside the same per-row transaction as the delete, for
/// cleaning up rows that reference the removed one.
pub(crate) fn prune<F>(
    conn: &Connection,
    table: LearningTable,
    floor: f64,
    on_remove: F,
) -> Result<PruneOutcome>
where
    F: Fn(&Connection, &str) -> Result<()>,
{
    validate_floor(floor)?;

    let select = format!("SELECT id FROM {} WHERE confidence < ?1", table.name());
    let candidates: Vec<String> = {
        let mut stmt = conn.prepare(&select)?;
        let rows = stmt.query_map(params![floor], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let delete = format!("DELETE FROM {} WHERE id = ?1", table.name());
    let mut outcome = PruneOutcome::default();
    for id in candidates {
        let result = (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            on_remove(&*tx, id.as_str())?;
            tx.execute(&delete, params![id])?;
            tx.commit()?;
            Ok(())
        })();
        match result {
            Ok(()) => outcome.removed.push(id),
            Err(e) => {
                outcome.errors += 1;
                warn!("Failed to prune {} {}: {}", table.entity(), id, e);
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::CORRIDOR_SCHEMA;
    use proptest::prelude::*;

    fn insert(conn: &Connection, id: &str, confidence: f64, last_used: DateTime<Utc>) {
        conn.execute(
            "INSERT INTO personal_learnings (id, origin_workspace, content, confidence, source, created_at, last_used)
             VALUES (?1, 'ws', 'content', ?2, 'test', ?3, ?3)",
            params![id, confidence, storage::ts(last_used)],
        )
        .unwrap();
    }

    fn confidence(conn: &Connection, id: &str) -> f64 {
        conn.query_row(
            "SELECT confidence FROM personal_learnings WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_decay_then_prune() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        let now = Utc::now();
        insert(&conn, "pl_old", 0.15, now - ChronoDuration::days(40));
        insert(&conn, "pl_fresh", 0.15, now - ChronoDuration::days(5));

        let outcome = decay(&conn, LearningTable::Personal, now, 30, 0.1).unwrap();
        assert_eq!(outcome.affected, 1);
        assert!((confidence(&conn, "pl_old") - 0.05).abs() < 1e-9);
        assert!((confidence(&conn, "pl_fresh") - 0.15).abs() < 1e-9);

        let pruned = prune(&conn, LearningTable::Personal, 0.1, |_, _| Ok(())).unwrap();
        assert_eq!(pruned.removed, vec!["pl_old".to_string()]);
        assert_eq!(pruned.errors, 0);
    }

    #[test]
    fn test_decay_is_idempotent_within_window() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        let now = Utc::now();
        insert(&conn, "pl_a", 0.9, now - ChronoDuration::days(40));

        assert_eq!(decay(&conn, LearningTable::Personal, now, 30, 0.1).unwrap().affected, 1);
        let later = now + ChronoDuration::days(1);
        assert_eq!(decay(&conn, LearningTable::Personal, later, 30, 0.1).unwrap().affected, 0);
        assert!((confidence(&conn, "pl_a") - 0.8).abs() < 1e-9);

        // A full window later the row is eligible again
        let next_window = now + ChronoDuration::days(31);
        assert_eq!(
            decay(&conn, LearningTable::Personal, next_window, 30, 0.1).unwrap().affected,
            1
        );
    }

    #[test]
    fn test_oversized_windows_are_rejected() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        let now = Utc::now();
        insert(&conn, "pl_a", 0.9, now - ChronoDuration::days(40));

        for days in [i64::MAX, MAX_WINDOW_DAYS + 1, -1] {
            assert!(matches!(
                decay(&conn, LearningTable::Personal, now, days, 0.1),
                Err(PalaceError::Validation(_))
            ));
        }
        assert!((confidence(&conn, "pl_a") - 0.9).abs() < 1e-9);

        assert!(days_before(now, i64::MAX).is_err());
        assert_eq!(
            days_before(now, 30).unwrap(),
            now - ChronoDuration::days(30)
        );
    }

    #[test]
    fn test_decay_floors_at_zero() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        let now = Utc::now();
        insert(&conn, "pl_low", 0.05, now - ChronoDuration::days(90));
        decay(&conn, LearningTable::Personal, now, 30, 0.5).unwrap();
        assert_eq!(confidence(&conn, "pl_low"), 0.0);
    }

    #[test]
    fn test_reinforce_counts_use_and_keeps_confidence() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        let then = Utc::now() - ChronoDuration::days(10);
        insert(&conn, "pl_r", 0.4, then);

        reinforce(&conn, LearningTable::Personal, "pl_r", Utc::now()).unwrap();
        let (uses, conf): (u32, f64) = conn
            .query_row(
                "SELECT use_count, confidence FROM personal_learnings WHERE id = 'pl_r'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(uses, 1);
        assert!((conf - 0.4).abs() < 1e-9);

        let err = reinforce(&conn, LearningTable::Personal, "pl_missing", Utc::now()).unwrap_err();
        assert!(matches!(err, PalaceError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_parameters_rejected_before_writes() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        assert!(decay(&conn, LearningTable::Personal, Utc::now(), 30, -0.1).is_err());
        assert!(decay(&conn, LearningTable::Personal, Utc::now(), -1, 0.1).is_err());
        assert!(decay(&conn, LearningTable::Personal, Utc::now(), 30, f64::NAN).is_err());
        assert!(prune(&conn, LearningTable::Personal, 1.5, |_, _| Ok(())).is_err());
    }

    #[test]
    fn test_prune_failure_leaves_row_in_place() {
        let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
        insert(&conn, "pl_x", 0.01, Utc::now());

        let outcome = prune(&conn, LearningTable::Personal, 0.1, |_, _| {
            Err(PalaceError::Other("cleanup failed".into()))
        })
        .unwrap();
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.errors, 1);
        assert!((confidence(&conn, "pl_x") - 0.01).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_decay_keeps_confidence_in_range(start in 0.0f64..=1.0, delta in 0.0f64..=2.0) {
            let conn = storage::open_in_memory(CORRIDOR_SCHEMA).unwrap();
            let now = Utc::now();
            insert(&conn, "pl_p", start, now - ChronoDuration::days(60));
            decay(&conn, LearningTable::Personal, now, 30, delta).unwrap();
            let c = confidence(&conn, "pl_p");
            prop_assert!((0.0..=1.0).contains(&c));
            prop_assert!(c <= start);
        }
    }
}
