//! Choosing what a handoff carries.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::agreement::Proposal;
use crate::item::MemoryItem;
use crate::redaction::sanitize_line;
use crate::rules::Rule;

/// Ordered selection plus per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSelection {
    /// Memory ids and rule ids in selection order.
    pub item_ids: Vec<String>,
    pub summary_lines: Vec<String>,
    pub decision_count: usize,
    pub proposal_count: usize,
    pub conflict_count: usize,
    pub rules_count: usize,
    pub impact_count: usize,
    /// Deep copies of every selected memory item. Rules carry no snapshot.
    pub snapshots: Vec<MemoryItem>,
}

impl HandoffSelection {
    fn take(&mut self, seen: &mut BTreeSet<String>, item: &MemoryItem) -> bool {
        if !seen.insert(item.id.clone()) {
            return false;
        }
        self.item_ids.push(item.id.clone());
        self.snapshots.push(item.clone());
        true
    }
}

/// Select in a fixed order:
///
/// 1. decisions, sender's lane first, then team lane
/// 2. items of pending team proposals
/// 3. items carrying a `conflicts_with` link
/// 4. active rules, priority descending then rule id
/// 5. items flagged with an impact warning
///
/// An item is selected at most once, under its first category.
pub fn select_handoff_items(
    agent_items: &[MemoryItem],
    team_items: &[MemoryItem],
    proposals: &[Proposal],
    rules: &[Rule],
) -> HandoffSelection {
    let mut selection = HandoffSelection::default();
    let mut seen = BTreeSet::new();
    let pool = || agent_items.iter().chain(team_items.iter());

    for item in pool().filter(|i| i.is_decision()) {
        if selection.take(&mut seen, item) {
            selection.decision_count += 1;
        }
    }
    for proposal in proposals.iter().filter(|p| p.is_pending()) {
        if selection.take(&mut seen, &proposal.memory_item) {
            selection.proposal_count += 1;
        }
    }
    for item in pool().filter(|i| i.has_conflicts()) {
        if selection.take(&mut seen, item) {
            selection.conflict_count += 1;
        }
    }

    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.rule_id.cmp(&b.rule_id)));
    for rule in ordered {
        if seen.insert(rule.rule_id.clone()) {
            selection.item_ids.push(rule.rule_id.clone());
            selection.rules_count += 1;
        }
    }

    for item in pool().filter(|i| i.meta.impact_warning.is_some()) {
        if selection.take(&mut seen, item) {
            selection.impact_count += 1;
        }
    }

    selection.summary_lines = vec![
        "Handoff packet summary.".to_string(),
        format!("Decision items count is {}.", selection.decision_count),
        format!("Pending proposals count is {}.", selection.proposal_count),
        format!("Conflicts count is {}.", selection.conflict_count),
        format!("Active rules count is {}.", selection.rules_count),
        format!("Impact warnings count is {}.", selection.impact_count),
    ];
    selection
}

/// Lines for the receiving agent: the packet size, the counts and a short
/// preview of the first decisions.
pub fn briefing_lines(
    item_ids: &[String],
    summary_lines: &[String],
    snapshots: &[MemoryItem],
) -> Vec<String> {
    let mut lines = vec![
        "Agent briefing.".to_string(),
        format!("Items in packet count is {}.", item_ids.len()),
    ];
    lines.extend(summary_lines.iter().skip(1).cloned());
    lines.extend(
        snapshots
            .iter()
            .filter(|item| item.is_decision())
            .take(3)
            .map(|item| format!("Decision {} says {}.", item.id, item.text)),
    );
    lines.iter().map(|line| sanitize_line(line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agreement::ProposalStatus;
    use crate::item::{Authority, EventType, ItemMeta, MemoryKind};
    use crate::links::{Link, LinkType};
    use crate::redaction::is_bracket_free;
    use crate::scope::{Lane, Space};

    fn item(id: &str, text: &str, event_type: EventType) -> MemoryItem {
        MemoryItem {
            id: id.into(),
            store_key: "store".into(),
            kind: MemoryKind::Semantic,
            text: text.into(),
            source: Authority::User,
            created_at: 1,
            meta: ItemMeta::new("phase-1", Space::Project, Lane::Agent, "demo")
                .with_event_type(event_type),
        }
    }

    fn proposal(memory_item: MemoryItem) -> Proposal {
        Proposal {
            proposal_id: "proposal-1".into(),
            team_id: "team-1".into(),
            phase_id: "phase-1".into(),
            memory_item,
            proposed_by: "user".into(),
            reason_code: "team".into(),
            approvals: Vec::new(),
            approval_count_required: 2,
            owner_override: true,
            status: ProposalStatus::Pending,
            ai_profile: "assistant".into(),
            decided_phase_id: None,
        }
    }

    fn fixture() -> HandoffSelection {
        let decision_old = item("decision-old", "Decision old", EventType::Decision);
        let mut conflict = item("conflict", "Conflict", EventType::Context);
        conflict.meta.links = vec![Link::new(LinkType::ConflictsWith, "older", "recency", "phase-1")];
        let mut impact = item("impact", "Impact", EventType::Context);
        impact.meta.impact_warning = Some("downstream".into());
        let decision_new = item("decision-new", "Decision (new)", EventType::Decision);
        let proposed = item("proposed", "Proposal", EventType::Context);

        let mut rule_1 = Rule::new("rule-1", "Only approvers can approve team proposals", 0);
        rule_1.created_at = 1;
        let rule_2 = Rule::new("rule-2", "Only contributors can create handoff packets", 1);

        select_handoff_items(
            &[decision_new, conflict],
            &[decision_old, impact],
            &[proposal(proposed)],
            &[rule_1, rule_2],
        )
    }

    #[test]
    fn test_selection_order_is_fixed() {
        let selection = fixture();
        assert_eq!(
            selection.item_ids,
            vec![
                "decision-new",
                "decision-old",
                "proposed",
                "conflict",
                "rule-2",
                "rule-1",
                "impact",
            ]
        );
        assert_eq!(selection.snapshots.len(), 5);
    }

    #[test]
    fn test_summary_lines_count_each_category() {
        let selection = fixture();
        assert_eq!(
            selection.summary_lines,
            vec![
                "Handoff packet summary.",
                "Decision items count is 2.",
                "Pending proposals count is 1.",
                "Conflicts count is 1.",
                "Active rules count is 2.",
                "Impact warnings count is 1.",
            ]
        );
    }

    #[test]
    fn test_briefing_lines_are_bracket_free() {
        let selection = fixture();
        let lines = briefing_lines(
            &selection.item_ids,
            &selection.summary_lines,
            &selection.snapshots,
        );
        assert_eq!(lines[1], "Items in packet count is 7.");
        assert!(lines.contains(&"Decision decision-new says Decision new.".to_string()));
        assert!(lines.iter().all(|l| is_bracket_free(l)));
    }
}
