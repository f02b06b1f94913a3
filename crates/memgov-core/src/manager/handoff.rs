//! Handoff packet lifecycle through the governed flow.

use serde::{Deserialize, Serialize};

use super::{CallContext, MemoryManager};
use crate::error::{GovernanceError, Result};
use crate::events::{MemoryEvent, MemoryTrace, TraceSink};
use crate::handoff::{
    apply_handoff_packet, briefing_lines, select_handoff_items, HandoffDraft, HandoffPacket,
    HandoffTarget,
};
use crate::item::{EventType, MemoryItem};
use crate::links::LinkTracker;
use crate::metrics::METRICS;
use crate::obs;
use crate::scope::{agent_lane_key, Space};
use crate::trust::TrustAction;

/// Who hands off to whom, and in which space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub from_agent_id: String,
    pub to_agent_id: String,
    #[serde(default = "default_space")]
    pub space: Space,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

fn default_space() -> Space {
    Space::Project
}

impl HandoffRequest {
    pub fn new(from_agent_id: impl Into<String>, to_agent_id: impl Into<String>) -> Self {
        Self {
            from_agent_id: from_agent_id.into(),
            to_agent_id: to_agent_id.into(),
            space: Space::Project,
            requested_by: None,
        }
    }

    pub fn with_space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn with_requested_by(mut self, actor: impl Into<String>) -> Self {
        self.requested_by = Some(actor.into());
        self
    }
}

/// Result of a create call: the packet, unless governance denied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffOutcome {
    pub packet: Option<HandoffPacket>,
    pub events: Vec<MemoryTrace>,
}

fn non_rule_items(items: Vec<&MemoryItem>) -> Vec<MemoryItem> {
    items
        .into_iter()
        .filter(|item| item.meta.rule.is_none())
        .cloned()
        .collect()
}

impl MemoryManager {
    /// Select the sender's decisions, pending proposals, conflicts, rules
    /// and impact warnings into a frozen pending packet.
    pub fn create_handoff(
        &mut self,
        call: &CallContext<'_>,
        request: &HandoffRequest,
    ) -> Result<HandoffOutcome> {
        if request.from_agent_id.trim().is_empty() {
            return Err(GovernanceError::missing_field("create_handoff", "from_agent_id"));
        }
        if request.to_agent_id.trim().is_empty() {
            return Err(GovernanceError::missing_field("create_handoff", "to_agent_id"));
        }
        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);

        let trust = self.resolve_trust(call, &mut sink);
        let actor_id = call.actor_id(request.requested_by.as_deref());
        let rules = self.team_rules();
        let gate = self.gate(
            &rules,
            TrustAction::HandoffCreate,
            call.identity.level(),
            &actor_id,
            &trust.rules,
            EventType::Context,
            &mut sink,
        );
        if !gate.allowed {
            return Ok(HandoffOutcome {
                packet: None,
                events: sink.into_traces(),
            });
        }

        let agent_key = agent_lane_key(&space_ctx, request.space, &request.from_agent_id);
        let team_key = space_ctx.team_key(request.space);
        let agent_items = non_rule_items(self.stores.semantic.items_for_store(&agent_key));
        let team_items = non_rule_items(self.stores.semantic.items_for_store(&team_key));
        let pending: Vec<_> = self
            .proposals
            .list_pending(&self.ctx.team_id)
            .into_iter()
            .cloned()
            .collect();
        let selection = select_handoff_items(&agent_items, &team_items, &pending, &rules);

        let phase_id = self
            .phases
            .current(&agent_key)
            .or_else(|| self.phases.current(&team_key))
            .map(|p| p.phase_id.clone())
            .unwrap_or_else(|| "phase-unknown".to_string());
        let packet = self.handoffs.create_packet(HandoffDraft {
            from_agent_id: request.from_agent_id.clone(),
            to_agent_id: request.to_agent_id.clone(),
            team_id: self.ctx.team_id.clone(),
            space: request.space,
            phase_id,
            created_by: actor_id,
            items: selection.item_ids,
            summary_lines: selection.summary_lines,
            snapshots: selection.snapshots,
        })?;
        sink.push(MemoryEvent::handoff_created(&packet));
        obs::emit_handoff_created(&packet.packet_id, packet.item_count());
        Ok(HandoffOutcome {
            packet: Some(packet),
            events: sink.into_traces(),
        })
    }

    /// Copy a pending packet's snapshots into the receiver's private lane.
    pub fn apply_handoff(
        &mut self,
        call: &CallContext<'_>,
        packet_id: &str,
        requested_by: Option<&str>,
    ) -> Result<Vec<MemoryTrace>> {
        let packet = self.handoffs.pending(packet_id)?.clone();
        packet.verify_integrity()?;

        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        let mut links = LinkTracker::new(self.ctx.config.max_links);

        let trust = self.resolve_trust(call, &mut sink);
        let actor_id = call.actor_id(requested_by);
        let rules = self.team_rules();
        let gate = self.gate(
            &rules,
            TrustAction::HandoffApply,
            call.identity.level(),
            &actor_id,
            &trust.rules,
            EventType::Context,
            &mut sink,
        );
        if !gate.allowed {
            return Ok(sink.into_traces());
        }

        let target_key = agent_lane_key(&space_ctx, packet.space, &packet.to_agent_id);
        let phase = self.ensure_phase(&target_key, None, "handoff", &mut sink);
        let policy = self.ctx.config.commit_policy();
        let outcome = apply_handoff_packet(
            &packet,
            &mut self.stores,
            &mut self.factory,
            &mut self.ledger,
            &mut links,
            &HandoffTarget {
                store_key: &target_key,
                phase: &phase,
                space: packet.space,
                owner: space_ctx.owner_for(packet.space),
                agent_id: &packet.to_agent_id,
            },
            &policy,
        );
        for item in &outcome.applied {
            self.bump_cache(&item.store_key, item.kind);
            sink.push(MemoryEvent::write(item, "handoff"));
        }
        for deletion in &outcome.deleted {
            self.bump_cache(&deletion.item.store_key, deletion.item.kind);
        }
        self.report_deletions(&outcome.deleted, None, &mut sink);

        let applied = self.handoffs.apply_packet(&packet.packet_id)?;
        sink.push(MemoryEvent::MemoryHandoffApplied {
            packet_id: applied.packet_id.clone(),
            to_agent_id: applied.to_agent_id.clone(),
            item_count: outcome.applied.len(),
        });
        let lines = briefing_lines(&applied.items, &applied.summary_lines, &applied.snapshots);
        sink.push(MemoryEvent::agent_briefing(&applied, lines));
        self.emit_link_events(&links, &mut sink);

        METRICS.inc_handoffs_applied();
        obs::emit_handoff_applied(&applied.packet_id, outcome.applied.len());
        Ok(sink.into_traces())
    }

    /// Mark a pending packet rejected. Nothing is copied.
    pub fn reject_handoff(
        &mut self,
        call: &CallContext<'_>,
        packet_id: &str,
        requested_by: Option<&str>,
    ) -> Result<Vec<MemoryTrace>> {
        self.handoffs.pending(packet_id)?;
        let space_ctx = self.space_context(call);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);

        let trust = self.resolve_trust(call, &mut sink);
        let actor_id = call.actor_id(requested_by);
        let rules = self.team_rules();
        let gate = self.gate(
            &rules,
            TrustAction::HandoffReject,
            call.identity.level(),
            &actor_id,
            &trust.rules,
            EventType::Context,
            &mut sink,
        );
        if !gate.allowed {
            return Ok(sink.into_traces());
        }
        let rejected = self.handoffs.reject_packet(packet_id)?;
        sink.push(MemoryEvent::MemoryHandoffRejected {
            packet_id: rejected.packet_id,
            rejected_by: actor_id,
        });
        Ok(sink.into_traces())
    }
}
