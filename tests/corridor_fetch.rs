//! Corridor links, cached fetches and cross-workspace search

mod common;

use common::{
    closed_port_url, copy_cache, create_test_corridor, create_test_workspace, human, write_direct,
};
use httpmock::prelude::*;
use palace_core::config::LinkSettings;
use palace_core::corridor::auth::AuthConfig;
use palace_core::{
    FetchOptions, PalaceConfig, PalaceError, RecordKind, SharedArtifact, StoreRequest,
};
use serde_json::json;
use serial_test::serial;
use std::fs;
use std::time::Duration;

fn remote_body(contents: &[&str]) -> serde_json::Value {
    json!({
        "version": 1,
        "workspace": "upstream",
        "exportedAt": "2026-03-01T12:00:00Z",
        "learnings": contents.iter().enumerate().map(|(i, c)| json!({
            "id": format!("l_{:012x}", i + 1),
            "content": c,
            "confidence": 0.9,
            "createdAt": "2026-03-01T12:00:00Z"
        })).collect::<Vec<_>>()
    })
}

#[test]
fn test_local_workspace_shares_through_corridor() {
    let ws = create_test_workspace();
    let record = write_direct(
        &ws.memory,
        StoreRequest::new("Always bump the schema version with migrations", human())
            .with_kind(RecordKind::Learning)
            .with_confidence(0.9),
    );
    for _ in 0..3 {
        ws.memory.reinforce_learning(record.id()).unwrap();
    }
    let published = ws.memory.write_shareable(0.5).unwrap();
    let artifact = SharedArtifact::read_from(&published).unwrap();
    assert_eq!(artifact.learnings.len(), 1);

    let (_dir, corridor) = create_test_corridor(PalaceConfig::default());
    assert!(matches!(
        corridor.auto_promote("backend", &ws.memory),
        Err(PalaceError::NotLinked(_))
    ));

    corridor
        .link("backend", ws.root().to_str().unwrap())
        .unwrap();
    let promoted = corridor.auto_promote("backend", &ws.memory).unwrap();
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].origin_id.as_deref(), Some(record.id()));
    assert!(corridor.auto_promote("backend", &ws.memory).unwrap().is_empty());

    let results = corridor.search("schema version", 10).unwrap();
    assert_eq!(results.personal.len(), 1);
    assert_eq!(results.linked.len(), 1);
    assert_eq!(results.linked[0].workspace, "backend");
    assert!(!results.linked[0].from_cache);
    assert!(results.warnings.is_empty());
}

#[test]
fn test_link_without_marker_is_refused() {
    let (dir, corridor) = create_test_corridor(PalaceConfig::default());
    let plain = dir.path().join("not-a-workspace");
    fs::create_dir_all(&plain).unwrap();

    assert!(matches!(
        corridor.link("plain", plain.to_str().unwrap()),
        Err(PalaceError::MissingWorkspaceMarker { .. })
    ));
    assert!(matches!(
        corridor.unlink("plain"),
        Err(PalaceError::NotLinked(_))
    ));
}

#[test]
fn test_remote_link_degrades_to_cache() {
    let server = MockServer::start();
    let mut live = server.mock(|when, then| {
        when.method(GET).path("/palace/shared.json");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(remote_body(&["Retry idempotent calls only"]));
    });

    let (_dir, corridor) = create_test_corridor(PalaceConfig::default());
    corridor
        .link("upstream", &server.url("/palace/shared.json"))
        .unwrap();

    let first = corridor
        .get_linked_learnings("upstream", FetchOptions::default())
        .unwrap();
    assert!(!first.from_cache);
    let cached = corridor
        .get_linked_learnings("upstream", FetchOptions::default())
        .unwrap();
    assert!(cached.from_cache);
    live.assert_hits(1);
    live.delete();

    server.mock(|when, then| {
        when.method(GET).path("/palace/shared.json");
        then.status(500);
    });
    let degraded = corridor.search("idempotent", 10).unwrap();
    assert_eq!(degraded.linked.len(), 1);
    assert!(degraded.warnings.is_empty(), "fresh cache needs no refresh");

    let forced = corridor
        .get_linked_learnings("upstream", FetchOptions::refresh())
        .unwrap();
    assert!(forced.from_cache);
    assert!(forced.warning.is_some());

    corridor.unlink("upstream").unwrap();
    assert!(corridor.cache_meta("upstream").is_none());
}

#[test]
#[serial]
fn test_missing_auth_variable_fails_the_link() {
    std::env::remove_var("PALACE_TEST_CORRIDOR_TOKEN");
    let server = MockServer::start();
    let mut unauthed = server.mock(|when, then| {
        when.method(GET).path("/shared.json");
        then.status(200).json_body(remote_body(&[]));
    });

    let mut config = PalaceConfig::default();
    config.corridor.links.insert(
        "secured".to_string(),
        LinkSettings {
            cache_ttl_secs: None,
            auth: Some(AuthConfig::Bearer {
                token: "${PALACE_TEST_CORRIDOR_TOKEN}".to_string(),
            }),
        },
    );
    let (_dir, corridor) = create_test_corridor(config);
    corridor.link("secured", &server.url("/shared.json")).unwrap();

    let summary = corridor
        .get_all_linked_learnings(FetchOptions::default())
        .unwrap();
    assert!(summary.results.is_empty());
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].error.contains("PALACE_TEST_CORRIDOR_TOKEN"));
    unauthed.assert_hits(0);
    unauthed.delete();

    std::env::set_var("PALACE_TEST_CORRIDOR_TOKEN", "s3cret");
    let authed = server.mock(|when, then| {
        when.method(GET)
            .path("/shared.json")
            .header("authorization", "Bearer s3cret");
        then.status(200).json_body(remote_body(&["Rotate keys quarterly"]));
    });
    let fetched = corridor
        .get_linked_learnings("secured", FetchOptions::default())
        .unwrap();
    assert_eq!(fetched.learnings.len(), 1);
    authed.assert();
    std::env::remove_var("PALACE_TEST_CORRIDOR_TOKEN");
}

#[test]
fn test_refused_connection_falls_back_to_cache() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/shared.json");
        then.status(200).json_body(remote_body(&["Seeded before the outage"]));
    });
    let (_seed_dir, seeded) = create_test_corridor(PalaceConfig::default());
    seeded.link("upstream", &server.url("/shared.json")).unwrap();
    seeded
        .get_linked_learnings("upstream", FetchOptions::default())
        .unwrap();

    let (_dir, corridor) = create_test_corridor(PalaceConfig::default());
    corridor
        .link("upstream", &closed_port_url("/shared.json"))
        .unwrap();
    copy_cache(&seeded, &corridor, "upstream");

    let degraded = corridor
        .get_linked_learnings("upstream", FetchOptions::refresh())
        .unwrap();
    assert!(degraded.from_cache);
    assert_eq!(degraded.learnings[0].content, "Seeded before the outage");
    assert!(degraded.warning.is_some());

    corridor
        .link("fresh", &closed_port_url("/shared.json"))
        .unwrap();
    assert!(matches!(
        corridor.get_linked_learnings("fresh", FetchOptions::default()),
        Err(PalaceError::Unavailable(_))
    ));
}

#[test]
fn test_slow_source_times_out_to_cache() {
    let server = MockServer::start();
    let mut live = server.mock(|when, then| {
        when.method(GET).path("/shared.json");
        then.status(200).json_body(remote_body(&["Served in time"]));
    });

    let mut config = PalaceConfig::default();
    config.corridor.fetch_timeout = Duration::from_millis(300);
    let (_dir, corridor) = create_test_corridor(config);
    corridor.link("slow", &server.url("/shared.json")).unwrap();
    corridor.link("cold", &server.url("/cold.json")).unwrap();
    corridor
        .get_linked_learnings("slow", FetchOptions::default())
        .unwrap();
    live.delete();

    server.mock(|when, then| {
        when.method(GET).path("/shared.json");
        then.status(200)
            .delay(Duration::from_secs(3))
            .json_body(remote_body(&["Too late"]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/cold.json");
        then.status(200)
            .delay(Duration::from_secs(3))
            .json_body(remote_body(&["Too late"]));
    });

    let degraded = corridor
        .get_linked_learnings("slow", FetchOptions::refresh())
        .unwrap();
    assert!(degraded.from_cache);
    assert_eq!(degraded.learnings[0].content, "Served in time");
    assert!(degraded.warning.is_some());

    assert!(matches!(
        corridor.get_linked_learnings("cold", FetchOptions::default()),
        Err(PalaceError::Unavailable(_))
    ));
}
