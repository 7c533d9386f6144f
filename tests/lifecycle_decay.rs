//! Confidence decay, pruning and the maintenance pass over time

mod common;

use chrono::{Duration, Utc};
use common::{create_test_corridor, create_test_workspace, human, propose, write_direct};
use palace_core::{
    Direction, PalaceConfig, PalaceError, ProposalStatus, RecordKind, Relation, StoreRequest,
};

fn learning_request(content: &str, confidence: f64) -> StoreRequest {
    StoreRequest::new(content, human())
        .with_kind(RecordKind::Learning)
        .with_confidence(confidence)
}

#[test]
fn test_decay_applies_once_per_window() {
    let ws = create_test_workspace();
    let record = write_direct(&ws.memory, learning_request("Cache keys need a version", 0.25));
    let start = Utc::now();

    // Nothing is old enough yet
    assert_eq!(ws.memory.decay_learnings_as_of(start, 30, 0.1).unwrap(), 0);

    let month_later = start + Duration::days(31);
    assert_eq!(ws.memory.decay_learnings_as_of(month_later, 30, 0.1).unwrap(), 1);
    let decayed = ws.memory.get_learning(record.id()).unwrap();
    assert!((decayed.confidence - 0.15).abs() < 1e-9);

    // Running again for the same window changes nothing
    assert_eq!(ws.memory.decay_learnings_as_of(month_later, 30, 0.1).unwrap(), 0);
    assert!((ws.memory.get_learning(record.id()).unwrap().confidence - 0.15).abs() < 1e-9);

    assert!(matches!(
        ws.memory.decay_learnings_as_of(month_later, 30, 1.5),
        Err(PalaceError::Validation(_))
    ));
}

#[test]
fn test_reinforced_learning_escapes_decay() {
    let ws = create_test_workspace();
    let record = write_direct(&ws.memory, learning_request("Pin the toolchain in CI", 0.9));
    let reinforced = ws.memory.reinforce_learning(record.id()).unwrap();
    assert_eq!(reinforced.use_count, 1);

    assert_eq!(
        ws.memory
            .decay_learnings_as_of(Utc::now() + Duration::days(10), 30, 0.1)
            .unwrap(),
        0
    );
}

#[test]
fn test_maintenance_prunes_and_expires() {
    let ws = create_test_workspace();
    let weak = write_direct(&ws.memory, learning_request("Old flaky heuristic", 0.15));
    let strong = write_direct(&ws.memory, learning_request("Strong durable lesson", 0.9));
    ws.memory
        .add_link(strong.id(), weak.id(), Relation::Supersedes)
        .unwrap();
    let proposal = propose(&ws.memory, "We decided to freeze the public API");

    let report = ws
        .memory
        .run_maintenance_as_of(Utc::now() + Duration::days(31))
        .unwrap();
    assert_eq!(report.decayed, 2);
    assert_eq!(report.pruned, 1);
    assert_eq!(report.proposals_expired, 1);
    assert_eq!(report.errors, 0);

    assert!(matches!(
        ws.memory.get_learning(weak.id()),
        Err(PalaceError::NotFound { .. })
    ));
    // Links of a pruned learning go with it
    assert!(ws
        .memory
        .links_for(strong.id(), Direction::Both)
        .unwrap()
        .is_empty());
    assert!(ws.memory.tags(weak.id()).unwrap().is_empty());
    assert_eq!(
        ws.memory.get_proposal(&proposal.id).unwrap().status,
        ProposalStatus::Expired
    );
    assert!(matches!(
        ws.memory.approve(&proposal.id, &human(), None),
        Err(PalaceError::AlreadyResolved { .. })
    ));
}

#[test]
fn test_personal_learnings_follow_the_same_lifecycle() {
    let (_dir, corridor) = create_test_corridor(PalaceConfig::default());
    let kept = corridor
        .add_personal_learning("manual", "Prefer small commits", 0.8, "ana")
        .unwrap();
    let faded = corridor
        .add_personal_learning("manual", "Some half-remembered trick", 0.15, "ana")
        .unwrap();

    let report = corridor
        .run_maintenance_as_of(Utc::now() + Duration::days(31))
        .unwrap();
    assert_eq!(report.decayed, 2);
    assert_eq!(report.pruned, 1);
    assert_eq!(report.proposals_expired, 0);

    let remaining = corridor.list_personal_learnings(None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.id);
    assert!(corridor.get_personal_learning(&faded.id).is_err());
}
