//! Memory trace event vocabulary.
//!
//! Every governance step is reported as a [`MemoryTrace`]: a flat record of
//! the AI profile, the session and one [`MemoryEvent`]. Text fields are
//! sanitized when the trace is built, so traces never carry bracket
//! characters or unredacted sensitive values.

use serde::{Deserialize, Serialize};

use crate::agreement::{AgreementSummary, Proposal};
use crate::handoff::HandoffPacket;
use crate::item::{EventType, MemoryItem, MemoryKind};
use crate::links::{link_lines, path_lines};
use crate::phase::{Phase, PhaseDiff};
use crate::redaction::{is_bracket_free, sanitize_line};
use crate::rules::{AppliedRule, Rule};
use crate::store::DeletionReason;
use crate::trust::{TrustAction, TrustDecision, TrustLevel, TrustRules};

/// Closed set of trace events. The serialized `type` is the event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    MemoryRecall {
        store_keys: Vec<String>,
        short_term_count: usize,
        semantic_count: usize,
        profile_count: usize,
        recall_hash: String,
    },
    MemoryWrite {
        memory_id: String,
        store_key: String,
        kind: MemoryKind,
        event_type: EventType,
        phase_id: String,
        reason: String,
    },
    MemoryTrustCheck {
        action: TrustAction,
        actor_id: String,
        actor_level: TrustLevel,
        required_level: TrustLevel,
        allowed: bool,
        reason: String,
    },
    MemoryTrustRules {
        team_id: String,
        source: String,
        lines: Vec<String>,
    },
    MemoryRuleApplied {
        rule_id: String,
        rule_text: String,
        action: TrustAction,
        event_type: EventType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required_level: Option<TrustLevel>,
        actor_level: TrustLevel,
        allowed: bool,
        reason: String,
    },
    MemoryRuleChanged {
        rule_id: String,
        rule_text: String,
        proposal_id: String,
        change: String,
    },
    MemoryRulesSnapshot {
        team_id: String,
        rule_count: usize,
        lines: Vec<String>,
    },
    MemoryProposed {
        proposal_id: String,
        team_id: String,
        memory_id: String,
        proposed_by: String,
        reason_code: String,
        approval_count_required: usize,
        preview: String,
    },
    MemoryApprovalRecorded {
        proposal_id: String,
        actor_id: String,
        recorded: bool,
        approval_count: usize,
        approval_count_required: usize,
    },
    MemoryApproved {
        proposal_id: String,
        memory_id: String,
        approved_by: Vec<String>,
    },
    MemoryRejected {
        proposal_id: String,
        memory_id: String,
        rejected_by: String,
    },
    MemoryAgreementSummary {
        team_id: String,
        from_phase_id: String,
        to_phase_id: String,
        title: String,
        lines: Vec<String>,
    },
    MemoryHandoffCreated {
        packet_id: String,
        from_agent_id: String,
        to_agent_id: String,
        item_count: usize,
        lines: Vec<String>,
    },
    MemoryHandoffApplied {
        packet_id: String,
        to_agent_id: String,
        item_count: usize,
    },
    MemoryHandoffRejected {
        packet_id: String,
        rejected_by: String,
    },
    MemoryAgentBriefing {
        packet_id: String,
        to_agent_id: String,
        lines: Vec<String>,
    },
    MemoryPhaseStarted {
        store_key: String,
        phase_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_phase_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        reason: String,
    },
    MemoryPhaseDiff {
        store_key: String,
        from_phase_id: String,
        to_phase_id: String,
        lines: Vec<String>,
    },
    MemoryDeleted {
        memory_id: String,
        store_key: String,
        phase_id: String,
        reason: DeletionReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaced_by: Option<String>,
    },
    MemoryLinks {
        memory_id: String,
        link_count: usize,
        lines: Vec<String>,
    },
    MemoryPath {
        memory_id: String,
        lines: Vec<String>,
    },
    MemoryImpact {
        memory_id: String,
        depth_used: usize,
        item_count: usize,
        lines: Vec<String>,
    },
    MemoryChangePreview {
        memory_id: String,
        change_kind: String,
        lines: Vec<String>,
    },
}

impl MemoryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MemoryRecall { .. } => "memory_recall",
            Self::MemoryWrite { .. } => "memory_write",
            Self::MemoryTrustCheck { .. } => "memory_trust_check",
            Self::MemoryTrustRules { .. } => "memory_trust_rules",
            Self::MemoryRuleApplied { .. } => "memory_rule_applied",
            Self::MemoryRuleChanged { .. } => "memory_rule_changed",
            Self::MemoryRulesSnapshot { .. } => "memory_rules_snapshot",
            Self::MemoryProposed { .. } => "memory_proposed",
            Self::MemoryApprovalRecorded { .. } => "memory_approval_recorded",
            Self::MemoryApproved { .. } => "memory_approved",
            Self::MemoryRejected { .. } => "memory_rejected",
            Self::MemoryAgreementSummary { .. } => "memory_agreement_summary",
            Self::MemoryHandoffCreated { .. } => "memory_handoff_created",
            Self::MemoryHandoffApplied { .. } => "memory_handoff_applied",
            Self::MemoryHandoffRejected { .. } => "memory_handoff_rejected",
            Self::MemoryAgentBriefing { .. } => "memory_agent_briefing",
            Self::MemoryPhaseStarted { .. } => "memory_phase_started",
            Self::MemoryPhaseDiff { .. } => "memory_phase_diff",
            Self::MemoryDeleted { .. } => "memory_deleted",
            Self::MemoryLinks { .. } => "memory_links",
            Self::MemoryPath { .. } => "memory_path",
            Self::MemoryImpact { .. } => "memory_impact",
            Self::MemoryChangePreview { .. } => "memory_change_preview",
        }
    }

    /// Mutable access to every free-text field.
    fn text_fields_mut(&mut self) -> Vec<&mut String> {
        let mut out: Vec<&mut String> = Vec::new();
        match self {
            Self::MemoryRecall { store_keys, recall_hash, .. } => {
                out.extend(store_keys.iter_mut());
                out.push(recall_hash);
            }
            Self::MemoryWrite { memory_id, store_key, phase_id, reason, .. } => {
                out.extend([memory_id, store_key, phase_id, reason]);
            }
            Self::MemoryTrustCheck { actor_id, reason, .. } => out.extend([actor_id, reason]),
            Self::MemoryTrustRules { team_id, source, lines } => {
                out.extend([team_id, source]);
                out.extend(lines.iter_mut());
            }
            Self::MemoryRuleApplied { rule_id, rule_text, reason, .. } => {
                out.extend([rule_id, rule_text, reason]);
            }
            Self::MemoryRuleChanged { rule_id, rule_text, proposal_id, change } => {
                out.extend([rule_id, rule_text, proposal_id, change]);
            }
            Self::MemoryRulesSnapshot { team_id, lines, .. } => {
                out.push(team_id);
                out.extend(lines.iter_mut());
            }
            Self::MemoryProposed {
                proposal_id,
                team_id,
                memory_id,
                proposed_by,
                reason_code,
                preview,
                ..
            } => out.extend([proposal_id, team_id, memory_id, proposed_by, reason_code, preview]),
            Self::MemoryApprovalRecorded { proposal_id, actor_id, .. } => {
                out.extend([proposal_id, actor_id]);
            }
            Self::MemoryApproved { proposal_id, memory_id, approved_by } => {
                out.extend([proposal_id, memory_id]);
                out.extend(approved_by.iter_mut());
            }
            Self::MemoryRejected { proposal_id, memory_id, rejected_by } => {
                out.extend([proposal_id, memory_id, rejected_by]);
            }
            Self::MemoryAgreementSummary { team_id, from_phase_id, to_phase_id, title, lines } => {
                out.extend([team_id, from_phase_id, to_phase_id, title]);
                out.extend(lines.iter_mut());
            }
            Self::MemoryHandoffCreated { packet_id, from_agent_id, to_agent_id, lines, .. } => {
                out.extend([packet_id, from_agent_id, to_agent_id]);
                out.extend(lines.iter_mut());
            }
            Self::MemoryHandoffApplied { packet_id, to_agent_id, .. } => {
                out.extend([packet_id, to_agent_id]);
            }
            Self::MemoryHandoffRejected { packet_id, rejected_by } => {
                out.extend([packet_id, rejected_by]);
            }
            Self::MemoryAgentBriefing { packet_id, to_agent_id, lines } => {
                out.extend([packet_id, to_agent_id]);
                out.extend(lines.iter_mut());
            }
            Self::MemoryPhaseStarted { store_key, phase_id, previous_phase_id, name, reason } => {
                out.extend([store_key, phase_id, reason]);
                out.extend(previous_phase_id.iter_mut());
                out.extend(name.iter_mut());
            }
            Self::MemoryPhaseDiff { store_key, from_phase_id, to_phase_id, lines } => {
                out.extend([store_key, from_phase_id, to_phase_id]);
                out.extend(lines.iter_mut());
            }
            Self::MemoryDeleted { memory_id, store_key, phase_id, replaced_by, .. } => {
                out.extend([memory_id, store_key, phase_id]);
                out.extend(replaced_by.iter_mut());
            }
            Self::MemoryLinks { memory_id, lines, .. }
            | Self::MemoryPath { memory_id, lines }
            | Self::MemoryImpact { memory_id, lines, .. } => {
                out.push(memory_id);
                out.extend(lines.iter_mut());
            }
            Self::MemoryChangePreview { memory_id, change_kind, lines } => {
                out.extend([memory_id, change_kind]);
                out.extend(lines.iter_mut());
            }
        }
        out
    }

    /// Every free-text field, in declaration order.
    pub fn text_fields(&self) -> Vec<String> {
        let mut copy = self.clone();
        let fields = copy.text_fields_mut().into_iter().map(|s| s.clone()).collect();
        fields
    }

    fn sanitize(&mut self) {
        for field in self.text_fields_mut() {
            *field = sanitize_line(field);
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn write(item: &MemoryItem, reason: &str) -> Self {
        Self::MemoryWrite {
            memory_id: item.id.clone(),
            store_key: item.store_key.clone(),
            kind: item.kind,
            event_type: item.meta.event_type,
            phase_id: item.meta.phase_id.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn trust_check(decision: &TrustDecision) -> Self {
        Self::MemoryTrustCheck {
            action: decision.action,
            actor_id: decision.actor_id.clone(),
            actor_level: decision.actor_level,
            required_level: decision.required_level,
            allowed: decision.allowed,
            reason: decision.reason.clone(),
        }
    }

    pub fn trust_rules(team_id: &str, source: &str, rules: &TrustRules) -> Self {
        let mut lines: Vec<String> = [
            TrustAction::Propose,
            TrustAction::Approve,
            TrustAction::Reject,
            TrustAction::HandoffCreate,
            TrustAction::HandoffApply,
            TrustAction::HandoffReject,
            TrustAction::ChangeRules,
        ]
        .into_iter()
        .map(|action| format!("{action} needs {}.", rules.required_level(action)))
        .collect();
        lines.push(format!("Required approvals is {}.", rules.required_approvals));
        lines.push(format!("Owner override is {}.", rules.owner_override));
        Self::MemoryTrustRules {
            team_id: team_id.to_string(),
            source: source.to_string(),
            lines,
        }
    }

    pub fn rule_applied(applied: &AppliedRule) -> Self {
        Self::MemoryRuleApplied {
            rule_id: applied.rule_id.clone(),
            rule_text: applied.rule_text.clone(),
            action: applied.action,
            event_type: applied.event_type,
            required_level: applied.required_level,
            actor_level: applied.actor_level,
            allowed: applied.allowed,
            reason: applied.reason.clone(),
        }
    }

    pub fn rules_snapshot(team_id: &str, rules: &[Rule]) -> Self {
        Self::MemoryRulesSnapshot {
            team_id: team_id.to_string(),
            rule_count: rules.len(),
            lines: rules.iter().map(Rule::summary_line).collect(),
        }
    }

    pub fn proposed(proposal: &Proposal) -> Self {
        Self::MemoryProposed {
            proposal_id: proposal.proposal_id.clone(),
            team_id: proposal.team_id.clone(),
            memory_id: proposal.memory_item.id.clone(),
            proposed_by: proposal.proposed_by.clone(),
            reason_code: proposal.reason_code.clone(),
            approval_count_required: proposal.approval_count_required,
            preview: proposal.memory_item.text.clone(),
        }
    }

    pub fn agreement_summary(
        team_id: &str,
        from_phase_id: &str,
        to_phase_id: &str,
        summary: &AgreementSummary,
    ) -> Self {
        Self::MemoryAgreementSummary {
            team_id: team_id.to_string(),
            from_phase_id: from_phase_id.to_string(),
            to_phase_id: to_phase_id.to_string(),
            title: summary.title.clone(),
            lines: summary.lines.clone(),
        }
    }

    pub fn handoff_created(packet: &HandoffPacket) -> Self {
        Self::MemoryHandoffCreated {
            packet_id: packet.packet_id.clone(),
            from_agent_id: packet.from_agent_id.clone(),
            to_agent_id: packet.to_agent_id.clone(),
            item_count: packet.item_count(),
            lines: packet.summary_lines.clone(),
        }
    }

    pub fn agent_briefing(packet: &HandoffPacket, lines: Vec<String>) -> Self {
        Self::MemoryAgentBriefing {
            packet_id: packet.packet_id.clone(),
            to_agent_id: packet.to_agent_id.clone(),
            lines,
        }
    }

    pub fn phase_started(phase: &Phase, previous: Option<&Phase>) -> Self {
        Self::MemoryPhaseStarted {
            store_key: phase.store_key.clone(),
            phase_id: phase.phase_id.clone(),
            previous_phase_id: previous.map(|p| p.phase_id.clone()),
            name: phase.name.clone(),
            reason: phase.reason.clone(),
        }
    }

    pub fn phase_diff(diff: &PhaseDiff) -> Self {
        let mut lines = diff.summary_lines();
        lines.extend(diff.top_changes());
        Self::MemoryPhaseDiff {
            store_key: diff.store_key.clone(),
            from_phase_id: diff.from_phase_id.clone(),
            to_phase_id: diff.to_phase_id.clone(),
            lines,
        }
    }

    pub fn deleted(item: &MemoryItem, reason: DeletionReason, replaced_by: Option<&str>) -> Self {
        Self::MemoryDeleted {
            memory_id: item.id.clone(),
            store_key: item.store_key.clone(),
            phase_id: item.meta.phase_id.clone(),
            reason,
            replaced_by: replaced_by.map(str::to_string),
        }
    }

    pub fn links(item: &MemoryItem) -> Self {
        Self::MemoryLinks {
            memory_id: item.id.clone(),
            link_count: item.link_count(),
            lines: link_lines(item),
        }
    }

    pub fn path(item: &MemoryItem) -> Self {
        Self::MemoryPath {
            memory_id: item.id.clone(),
            lines: path_lines(item),
        }
    }
}

/// One emitted trace: `{ "type": ..., "ai_profile": ..., "session": ..., ...fields }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTrace {
    pub ai_profile: String,
    pub session: String,
    #[serde(flatten)]
    pub event: MemoryEvent,
}

impl MemoryTrace {
    /// Build a trace, sanitizing every text field.
    pub fn new(ai_profile: &str, session: &str, mut event: MemoryEvent) -> Self {
        event.sanitize();
        Self {
            ai_profile: sanitize_line(ai_profile),
            session: sanitize_line(session),
            event,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    /// True when no text field carries a bracket, brace or parenthesis.
    pub fn is_bracket_free(&self) -> bool {
        is_bracket_free(&self.ai_profile)
            && is_bracket_free(&self.session)
            && self.event.text_fields().iter().all(|f| is_bracket_free(f))
    }
}

/// Builds traces for one call, bound to a profile and session.
#[derive(Debug, Clone)]
pub struct TraceSink {
    ai_profile: String,
    session: String,
    traces: Vec<MemoryTrace>,
}

impl TraceSink {
    pub fn new(ai_profile: &str, session: &str) -> Self {
        Self {
            ai_profile: ai_profile.to_string(),
            session: session.to_string(),
            traces: Vec::new(),
        }
    }

    pub fn push(&mut self, event: MemoryEvent) {
        self.traces
            .push(MemoryTrace::new(&self.ai_profile, &self.session, event));
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = MemoryEvent>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn into_traces(self) -> Vec<MemoryTrace> {
        self.traces
    }
}
