//! End-to-end proposal workflow against an on-disk workspace store

mod common;

use common::{agent, create_test_workspace, human, propose, write_direct};
use palace_core::audit::{DIRECT_WRITE, PROPOSAL_APPROVE, PROPOSAL_CREATE, PROPOSAL_REJECT};
use palace_core::{
    Authority, PalaceError, ProposalKind, ProposalStatus, Record, RecordFilter, RecordKind,
    Scope, StoreAction, StoreRequest, WorkspaceMemory,
};

#[test]
fn test_agent_decision_goes_through_review() {
    let ws = create_test_workspace();
    let text = "We decided to use JWT for service auth because sessions do not scale";

    let proposal = propose(&ws.memory, text);
    assert_eq!(proposal.proposed_as, ProposalKind::Decision);
    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert!(ws.memory.list_decisions().unwrap().is_empty());

    // Agents cannot approve their own proposals
    assert!(matches!(
        ws.memory.approve(&proposal.id, &agent(), None),
        Err(PalaceError::Forbidden(_))
    ));

    let record = ws.memory.approve(&proposal.id, &human(), Some("ship it")).unwrap();
    let Record::Decision(decision) = record else {
        panic!("expected a decision");
    };
    assert_eq!(decision.authority, Authority::Approved);
    assert!(decision.tags.contains(&"jwt".to_string()));

    let resolved = ws.memory.get_proposal(&proposal.id).unwrap();
    assert_eq!(resolved.status, ProposalStatus::Approved);
    assert_eq!(resolved.promoted_to_id.as_deref(), Some(decision.id.as_str()));
    assert_eq!(resolved.reviewed_by.as_deref(), Some("ana"));

    // A second approval does not create a second record
    assert!(matches!(
        ws.memory.approve(&proposal.id, &human(), None),
        Err(PalaceError::AlreadyResolved { status: ProposalStatus::Approved, .. })
    ));
    assert_eq!(ws.memory.list_decisions().unwrap().len(), 1);

    let actions: Vec<String> = ws.audit.entries().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![PROPOSAL_CREATE.to_string(), PROPOSAL_APPROVE.to_string()]);
}

#[test]
fn test_ideas_skip_governance() {
    let ws = create_test_workspace();
    let result = ws
        .memory
        .store(StoreRequest::new("What if we cache the `tokenizer` output?", agent()))
        .unwrap();

    assert_eq!(result.classification.kind, RecordKind::Idea);
    let StoreAction::Written(Record::Idea(idea)) = result.action else {
        panic!("ideas are written directly");
    };
    assert!(idea.tags.contains(&"tokenizer".to_string()));
    assert!(ws.memory.pending_proposals().unwrap().is_empty());
    assert!(ws.audit.entries().is_empty());
}

#[test]
fn test_duplicate_proposals_are_rejected_until_resolved() {
    let ws = create_test_workspace();
    let text = "Turns out the flaky test was a timezone bug";

    let first = propose(&ws.memory, text);
    let err = ws
        .memory
        .store(StoreRequest::new(text, agent()))
        .unwrap_err();
    assert!(matches!(
        err,
        PalaceError::DuplicateProposal { ref existing_id } if *existing_id == first.id
    ));

    // Same text in another scope is a different proposal
    let scoped = ws
        .memory
        .store(StoreRequest::new(text, agent()).with_scope(Scope::Room("ci".to_string())))
        .unwrap();
    assert!(matches!(scoped.action, StoreAction::Proposed(_)));

    ws.memory.reject(&first.id, &human(), Some("not reproducible")).unwrap();
    let again = propose(&ws.memory, text);
    assert_ne!(again.id, first.id);

    let rejected = ws.memory.list_proposals(ProposalStatus::Rejected).unwrap();
    assert_eq!(rejected.len(), 1);
    assert!(ws
        .audit
        .entries()
        .iter()
        .any(|e| e.action == PROPOSAL_REJECT && e.target_id == first.id));
}

#[test]
fn test_approved_learning_gets_starting_confidence() {
    let ws = create_test_workspace();
    let proposal = propose(&ws.memory, "Lesson: always run migrations before seeding");
    assert_eq!(proposal.proposed_as, ProposalKind::Learning);

    let Record::Learning(learning) = ws.memory.approve(&proposal.id, &human(), None).unwrap()
    else {
        panic!("expected a learning");
    };
    assert!(learning.confidence >= ws.memory.config().governance.default_learning_confidence);
    assert!(learning.confidence <= 1.0);
    assert_eq!(learning.use_count, 0);

    let reinforced = ws.memory.reinforce_learning(&learning.id).unwrap();
    assert_eq!(reinforced.use_count, 1);
    assert!(reinforced.last_used >= learning.last_used);
}

#[test]
fn test_human_direct_write_is_audited_as_bypass() {
    let ws = create_test_workspace();

    // Agents may not bypass the gate
    let err = ws
        .memory
        .store(StoreRequest::new("We decided to drop Python 3.8", agent()).direct())
        .unwrap_err();
    assert!(matches!(err, PalaceError::Forbidden(_)));

    let record = write_direct(
        &ws.memory,
        StoreRequest::new("We decided to drop Python 3.8", human())
            .with_rationale("EOL upstream"),
    );
    assert_eq!(record.kind(), RecordKind::Decision);

    let entries = ws.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, DIRECT_WRITE);
    assert_eq!(entries[0].details["bypass"], true);
    assert!(entries[0].details.get("content").is_none());
}

#[test]
fn test_store_survives_reopen() {
    let ws = create_test_workspace();
    let record = write_direct(
        &ws.memory,
        StoreRequest::new("Never share fixtures between test modules", human())
            .with_kind(RecordKind::Learning),
    );
    propose(&ws.memory, "We will move builds to the new runners");

    let reopened = WorkspaceMemory::open(ws.root()).unwrap();
    assert_eq!(reopened.get_record(record.id()).unwrap(), record);
    assert_eq!(reopened.pending_proposals().unwrap().len(), 1);

    let found = reopened
        .list_records(&RecordFilter::new().with_query("FIXTURES"))
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_jwt_decision_and_caching_idea() {
    let ws = create_test_workspace();

    let proposal = propose(&ws.memory, "Let's use JWT for authentication");
    assert_eq!(proposal.proposed_as, ProposalKind::Decision);
    ws.memory.approve(&proposal.id, &human(), None).unwrap();
    let decisions = ws.memory.list_decisions().unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].authority, Authority::Approved);
    assert_eq!(decisions[0].content, "Let's use JWT for authentication");

    let result = ws
        .memory
        .store(StoreRequest::new("What if we add caching?", agent()))
        .unwrap();
    assert!(matches!(result.action, StoreAction::Written(Record::Idea(_))));
    let ideas = ws.memory.list_ideas().unwrap();
    assert_eq!(ideas.len(), 1);
    assert_eq!(ideas[0].content, "What if we add caching?");
}
