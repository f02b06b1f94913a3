//! Trust levels, team rules and the order they are checked in.

use memgov_core::events::MemoryEvent;
use memgov_core::state::StateMap;
use memgov_core::{
    can_approve, can_change_rules, can_handoff_create, can_propose, enforce_action, AgentProfile,
    CallContext, EventType, GovernanceConfig, GovernanceContext, HandoffRequest, Identity,
    MemoryManager, MemoryTrace, Rule, RuleProposal, TrustAction, TrustLevel, TrustRules,
};

fn denial_reasons(traces: &[MemoryTrace]) -> Vec<(String, String)> {
    traces
        .iter()
        .filter_map(|t| match &t.event {
            MemoryEvent::MemoryRuleApplied {
                rule_id,
                allowed: false,
                reason,
                ..
            } => Some((rule_id.clone(), reason.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn default_trust_table() {
    let rules = TrustRules::standard();
    assert!(can_propose(TrustLevel::Contributor, &rules).allowed);
    assert!(!can_approve(TrustLevel::Contributor, &rules).allowed);
    assert!(can_approve(TrustLevel::Approver, &rules).allowed);
    assert!(can_handoff_create(TrustLevel::Contributor, &rules).allowed);
    assert!(!can_handoff_create(TrustLevel::Viewer, &rules).allowed);
    assert!(!can_change_rules(TrustLevel::Approver, &rules).allowed);
    assert!(can_change_rules(TrustLevel::Owner, &rules).allowed);
}

#[test]
fn denial_explains_levels() {
    let decision = can_approve(TrustLevel::Contributor, &TrustRules::standard());
    assert_eq!(decision.required_level, TrustLevel::Approver);
    assert_eq!(decision.actor_level, TrustLevel::Contributor);
    assert!(decision.reason.contains("approver"));
}

#[test]
fn identity_levels_fall_back_to_role() {
    assert_eq!(Identity::new("a").with_role("maintainer").level(), TrustLevel::Approver);
    assert_eq!(Identity::new("a").with_role("admin").level(), TrustLevel::Owner);
    assert_eq!(Identity::new("a").with_role("guest").level(), TrustLevel::Viewer);
    assert_eq!(Identity::anonymous().level(), TrustLevel::Viewer);
}

#[test]
fn approvers_rule_blocks_only_governed_actions_for_contributors() {
    let rule = Rule::new("rule-1", "Only approvers can create handoffs", 0);
    let check = enforce_action(
        &[rule.clone()],
        TrustAction::HandoffCreate,
        TrustLevel::Contributor,
        EventType::Context,
    );
    assert!(!check.allowed);
    assert!(check.denial_reason().unwrap().contains("rule-1"));

    let passes = enforce_action(
        &[rule.clone()],
        TrustAction::HandoffCreate,
        TrustLevel::Approver,
        EventType::Context,
    );
    assert!(passes.allowed);

    let unrelated = enforce_action(&[rule], TrustAction::Propose, TrustLevel::Contributor, EventType::Rule);
    assert!(unrelated.allowed);
    assert!(unrelated.applied.is_empty());
}

#[test]
fn owner_rule_denies_contributor_handoff_naming_the_rule() {
    let mut m = MemoryManager::new(GovernanceContext::new("team-1"));
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();

    let owner = Identity::new("olivia").with_trust_level("owner");
    let call = CallContext::new(&profile, &state, &owner);
    m.propose_rule(&call, &RuleProposal::new("Only approvers can create handoffs"))
        .unwrap();
    let rules = m.team_rules();
    assert_eq!(rules.len(), 1);
    let rule_id = rules[0].rule_id.clone();

    let carol = Identity::new("carol").with_trust_level("contributor");
    let call = CallContext::new(&profile, &state, &carol);
    let outcome = m
        .create_handoff(&call, &HandoffRequest::new("planner", "coder"))
        .unwrap();
    assert!(outcome.packet.is_none());
    assert!(m.list_handoff_packets("team-1").is_empty());

    let denials = denial_reasons(&outcome.events);
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].0, rule_id);
    assert!(denials[0].1.contains(&rule_id));
    // The trust check never runs once a rule denies.
    assert!(outcome.events.iter().all(|t| t.kind() != "memory_trust_check"));
}

#[test]
fn approval_rule_leaves_contributor_proposals_open() {
    let mut m = MemoryManager::new(GovernanceContext::new("team-1"));
    let profile = AgentProfile::new("assistant");
    let state = StateMap::new();

    let owner = Identity::new("olivia").with_trust_level("owner");
    let call = CallContext::new(&profile, &state, &owner);
    m.propose_rule(&call, &RuleProposal::new("Only approvers can approve team proposals"))
        .unwrap();
    assert_eq!(m.team_rules().len(), 1);

    let carol = Identity::new("carol").with_trust_level("contributor");
    let call = CallContext::new(&profile, &state, &carol);
    let traces = m
        .propose_rule(&call, &RuleProposal::new("Decisions need 3 approvals"))
        .unwrap();
    assert!(denial_reasons(&traces).is_empty());
    assert!(traces.iter().any(|t| t.kind() == "memory_proposed"));
    let pending: Vec<_> = m
        .list_team_proposals("team-1")
        .into_iter()
        .filter(|p| p.is_pending())
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].proposed_by, "carol");
}

#[test]
fn configured_default_rule_is_always_active() {
    let config = GovernanceConfig {
        default_rules: vec!["Only approvers can approve".into()],
        ..GovernanceConfig::standard()
    };
    let m = MemoryManager::new(GovernanceContext::new("team-1").with_config(config));
    let rules = m.team_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].spec.required_level, Some(TrustLevel::Approver));
}

#[test]
fn state_trust_override_is_ignored_for_non_owners() {
    let mut m = MemoryManager::new(GovernanceContext::new("team-1"));
    let profile = AgentProfile::new("assistant");
    let mut state = StateMap::new();
    state.insert(
        "_memory_trust_rules".into(),
        serde_json::json!({"who_can_handoff_create": "owner"}),
    );
    let carol = Identity::new("carol").with_trust_level("contributor");
    let call = CallContext::new(&profile, &state, &carol);
    let outcome = m
        .create_handoff(&call, &HandoffRequest::new("planner", "coder"))
        .unwrap();
    assert!(outcome.packet.is_some());
    assert_eq!(outcome.events[0].kind(), "memory_trust_check");
}
