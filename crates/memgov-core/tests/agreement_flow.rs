//! Proposal voting: idempotent approvals, quorum, owner override and
//! terminal statuses.

use memgov_core::agreement::{
    AgreementError, AgreementRequest, ProposalDraft, ProposalStatus, ProposalStore,
};
use memgov_core::item::{Authority, ItemMeta, MemoryKind};
use memgov_core::scope::{Lane, Space};
use memgov_core::state::StateMap;
use memgov_core::store::MemoryItemFactory;
use memgov_core::{
    AgentProfile, CallContext, GovernanceContext, GovernanceError, Identity, MemoryManager,
    MemoryTrace, RuleProposal,
};

fn draft(required: usize) -> ProposalDraft {
    let mut factory = MemoryItemFactory::new();
    let item = factory.create(
        "project:team-1:team",
        MemoryKind::Semantic,
        "We decided to ship Friday",
        Authority::User,
        ItemMeta::new("phase-1", Space::Project, Lane::Team, "team-1"),
    );
    ProposalDraft {
        team_id: "team-1".to_string(),
        phase_id: "phase-1".to_string(),
        memory_item: item,
        proposed_by: "carol".to_string(),
        reason_code: "team_request".to_string(),
        approval_count_required: required,
        owner_override: true,
        ai_profile: "assistant".to_string(),
    }
}

fn kinds(traces: &[MemoryTrace]) -> Vec<&'static str> {
    traces.iter().map(|t| t.kind()).collect()
}

fn approver(id: &str) -> Identity {
    Identity::new(id).with_trust_level("approver")
}

/// Carol proposes a rule; returns the manager and the proposal id.
fn pending_rule() -> (MemoryManager, String) {
    let mut m = MemoryManager::new(GovernanceContext::new("team-1"));
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();
    let carol = Identity::new("carol").with_trust_level("contributor");
    let call = CallContext::new(&profile, &state, &carol);
    m.propose_rule(&call, &RuleProposal::new("Contributors can propose"))
        .unwrap();
    let id = m.list_team_proposals("team-1")[0].proposal_id.clone();
    (m, id)
}

fn approve_as(m: &mut MemoryManager, identity: &Identity, id: &str) -> Vec<MemoryTrace> {
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();
    let call = CallContext::new(&profile, &state, identity);
    m.apply_agreement(&call, &AgreementRequest::approve(Some(id)))
        .unwrap()
}

// ── Store level ──────────────────────────────────────────────────────────

#[test]
fn repeated_approval_is_recorded_once() {
    let mut store = ProposalStore::new();
    let proposal = store.create_proposal(draft(2));
    let (_, first) = store.record_approval(&proposal.proposal_id, "alice").unwrap();
    let (after, second) = store.record_approval(&proposal.proposal_id, "alice").unwrap();
    assert_eq!([first, second], [true, false]);
    assert_eq!(after.approvals.len(), 1);
    assert!(!after.quorum_reached());
}

#[test]
fn quorum_needs_distinct_actors() {
    let mut store = ProposalStore::new();
    let proposal = store.create_proposal(draft(2));
    store.record_approval(&proposal.proposal_id, "alice").unwrap();
    let (p, _) = store.record_approval(&proposal.proposal_id, "alice").unwrap();
    assert!(!p.quorum_reached());
    let (p, _) = store.record_approval(&proposal.proposal_id, "bob").unwrap();
    assert!(p.quorum_reached());
}

#[test]
fn rejected_proposal_cannot_be_approved() {
    let mut store = ProposalStore::new();
    let proposal = store.create_proposal(draft(1));
    store.reject(&proposal.proposal_id, "phase-1").unwrap();
    let err = store.approve(&proposal.proposal_id, "phase-1").unwrap_err();
    assert!(matches!(err, AgreementError::NotPending { .. }));
    assert!(store
        .record_approval(&proposal.proposal_id, "bob")
        .is_err());
}

// ── Through the manager ──────────────────────────────────────────────────

#[test]
fn two_approvers_install_the_rule() {
    let (mut m, id) = pending_rule();
    assert!(m.team_rules().is_empty());

    let first = approve_as(&mut m, &approver("ann"), &id);
    assert!(kinds(&first).contains(&"memory_approval_recorded"));
    assert!(!kinds(&first).contains(&"memory_approved"));

    let repeat = approve_as(&mut m, &approver("ann"), &id);
    assert!(!kinds(&repeat).contains(&"memory_approved"));
    assert_eq!(m.get_proposal(&id).unwrap().approvals, vec!["ann"]);

    let second = approve_as(&mut m, &approver("ben"), &id);
    let k = kinds(&second);
    assert!(k.contains(&"memory_approved"));
    assert!(k.contains(&"memory_rule_changed"));
    assert!(k.contains(&"memory_rules_snapshot"));
    assert_eq!(m.get_proposal(&id).unwrap().status, ProposalStatus::Approved);
    assert_eq!(m.team_rules().len(), 1);
}

#[test]
fn single_owner_approval_overrides_quorum() {
    let (mut m, id) = pending_rule();
    let owner = Identity::new("olivia").with_trust_level("owner");
    let traces = approve_as(&mut m, &owner, &id);
    assert!(kinds(&traces).contains(&"memory_approved"));
    assert_eq!(m.get_proposal(&id).unwrap().approvals, vec!["olivia"]);
    assert_eq!(m.team_rules().len(), 1);
}

#[test]
fn contributor_vote_is_denied_without_error() {
    let (mut m, id) = pending_rule();
    let carol = Identity::new("carol").with_trust_level("contributor");
    let traces = approve_as(&mut m, &carol, &id);
    assert!(kinds(&traces).contains(&"memory_trust_check"));
    assert!(!kinds(&traces).contains(&"memory_approval_recorded"));
    assert!(m.get_proposal(&id).unwrap().approvals.is_empty());
}

#[test]
fn decided_proposal_rejects_further_votes() {
    let (mut m, id) = pending_rule();
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();
    let ann = approver("ann");
    let call = CallContext::new(&profile, &state, &ann);
    m.apply_agreement(&call, &AgreementRequest::reject(Some(&id)))
        .unwrap();
    assert_eq!(m.get_proposal(&id).unwrap().status, ProposalStatus::Rejected);

    let err = m
        .apply_agreement(&call, &AgreementRequest::approve(Some(&id)))
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Agreement(AgreementError::NotPending { .. })
    ));
}

#[test]
fn auto_id_with_nothing_pending_is_an_error() {
    let mut m = MemoryManager::new(GovernanceContext::new("team-1"));
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();
    let ann = approver("ann");
    let call = CallContext::new(&profile, &state, &ann);
    let err = m
        .apply_agreement(&call, &AgreementRequest::approve(None))
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::Agreement(AgreementError::NoPendingProposal(_))
    ));
}
