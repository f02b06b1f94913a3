//! Rule proposals, agreement decisions, phase control and impact reports.

use serde::{Deserialize, Serialize};

use super::{is_auto_id, CallContext, MemoryManager, ResolvedTrust};
use crate::agreement::{
    agreement_summary, AgreementAction, AgreementError, AgreementRequest, ProposalDraft,
};
use crate::error::{GovernanceError, Result};
use crate::events::{MemoryEvent, MemoryTrace, TraceSink};
use crate::impact::{compute_impact, render_change_preview, render_impact};
use crate::item::{EventType, ItemMeta};
use crate::links::{Link, LinkTracker, LinkType};
use crate::obs;
use crate::phase::{diff_phases, phase_ids_between, PhaseRequest};
use crate::rules::{build_rule_item, enforce_action, merge_required_approvals, RuleStatus};
use crate::scope::{Lane, Space, SpaceContext};
use crate::state::{DiffRequest, ImpactRequest};
use crate::trust::{TrustAction, TrustLevel};

/// A request to add a team rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleProposal {
    pub text: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl RuleProposal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            priority: 0,
            requested_by: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requested_by(mut self, actor: impl Into<String>) -> Self {
        self.requested_by = Some(actor.into());
        self
    }
}

impl MemoryManager {
    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    /// Propose a team rule. The rule becomes active only once its proposal
    /// is approved; an owner proposer with owner override approves it on
    /// the spot.
    pub fn propose_rule(
        &mut self,
        call: &CallContext<'_>,
        proposal: &RuleProposal,
    ) -> Result<Vec<MemoryTrace>> {
        let text = proposal.text.trim();
        if text.is_empty() {
            return Err(GovernanceError::missing_field("propose_rule", "text"));
        }
        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        let mut links = LinkTracker::new(self.ctx.config.max_links);

        let trust = self.resolve_trust(call, &mut sink);
        if !trust.overridden {
            sink.push(MemoryEvent::trust_rules(&self.ctx.team_id, "config", &trust.rules));
        }
        let actor_id = call.actor_id(proposal.requested_by.as_deref());
        let level = call.identity.level();
        let rules = self.team_rules();
        let gate = self.gate(
            &rules,
            TrustAction::Propose,
            level,
            &actor_id,
            &trust.rules,
            EventType::Rule,
            &mut sink,
        );
        if !gate.allowed {
            return Ok(sink.into_traces());
        }

        let team_key = self.team_store_key();
        let phase_request = crate::state::phase_request(call.state);
        let phase = self.ensure_phase(&team_key, phase_request.as_ref(), "agreement", &mut sink);
        let meta = ItemMeta::new(&phase.phase_id, Space::Project, Lane::Team, &space_ctx.project_id);
        let rule_item = build_rule_item(
            &mut self.factory,
            &team_key,
            text,
            meta,
            RuleStatus::Pending,
            proposal.priority,
            &actor_id,
        );
        let approval_rules = enforce_action(&rules, TrustAction::Approve, level, EventType::Rule);
        let required = merge_required_approvals(
            trust.rules.required_approvals,
            gate.required_approvals.max(approval_rules.required_approvals),
        );
        let created = self.proposals.create_proposal(ProposalDraft {
            team_id: self.ctx.team_id.clone(),
            phase_id: phase.phase_id.clone(),
            memory_item: rule_item,
            proposed_by: actor_id.clone(),
            reason_code: "rule_proposal".to_string(),
            approval_count_required: required,
            owner_override: trust.rules.owner_override,
            ai_profile: call.profile.name.clone(),
        });
        sink.push(MemoryEvent::proposed(&created));

        if level == TrustLevel::Owner && trust.rules.owner_override {
            self.decide_proposal(
                call,
                &space_ctx,
                &trust,
                &created.proposal_id,
                AgreementAction::Approve,
                Some(&actor_id),
                &mut links,
                &mut sink,
            )?;
        }
        self.emit_link_events(&links, &mut sink);
        Ok(sink.into_traces())
    }

    // ------------------------------------------------------------------
    // Agreement
    // ------------------------------------------------------------------

    /// Approve or reject a pending proposal. An auto id picks the first
    /// pending proposal of the team.
    pub fn apply_agreement(
        &mut self,
        call: &CallContext<'_>,
        request: &AgreementRequest,
    ) -> Result<Vec<MemoryTrace>> {
        let proposal_id = self
            .select_proposal(request)?
            .ok_or_else(|| AgreementError::NoPendingProposal(self.ctx.team_id.clone()))?;
        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        let mut links = LinkTracker::new(self.ctx.config.max_links);
        let trust = self.resolve_trust(call, &mut sink);
        self.decide_proposal(
            call,
            &space_ctx,
            &trust,
            &proposal_id,
            request.action,
            request.requested_by.as_deref(),
            &mut links,
            &mut sink,
        )?;
        self.emit_link_events(&links, &mut sink);
        Ok(sink.into_traces())
    }

    /// Resolve the proposal a request targets. `Ok(None)` means an auto id
    /// found nothing pending.
    pub(crate) fn select_proposal(&self, request: &AgreementRequest) -> Result<Option<String>> {
        let explicit = request
            .proposal_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !is_auto_id(id));
        match explicit {
            Some(id) => {
                let proposal = self
                    .proposals
                    .get(id)
                    .ok_or_else(|| AgreementError::ProposalNotFound(id.to_string()))?;
                if !proposal.is_pending() {
                    return Err(AgreementError::NotPending {
                        proposal_id: id.to_string(),
                        status: proposal.status.to_string(),
                    }
                    .into());
                }
                Ok(Some(id.to_string()))
            }
            None => Ok(self
                .proposals
                .select_pending(&self.ctx.team_id, None)
                .map(|p| p.proposal_id.clone())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decide_proposal(
        &mut self,
        call: &CallContext<'_>,
        space_ctx: &SpaceContext,
        trust: &ResolvedTrust,
        proposal_id: &str,
        action: AgreementAction,
        requested_by: Option<&str>,
        links: &mut LinkTracker,
        sink: &mut TraceSink,
    ) -> Result<()> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| AgreementError::ProposalNotFound(proposal_id.to_string()))?;
        let actor_id = call.actor_id(requested_by);
        let level = call.identity.level();
        let rules = self.team_rules();
        let trust_action = match action {
            AgreementAction::Approve => TrustAction::Approve,
            AgreementAction::Reject => TrustAction::Reject,
        };
        let gate = self.gate(
            &rules,
            trust_action,
            level,
            &actor_id,
            &trust.rules,
            proposal.memory_item.meta.event_type,
            sink,
        );
        if !gate.allowed {
            return Ok(());
        }

        let team_key = self.team_store_key();
        match action {
            AgreementAction::Reject => {
                let phase = self.ensure_phase(&team_key, None, "agreement", sink);
                let rejected = self.proposals.reject(proposal_id, &phase.phase_id)?;
                sink.push(MemoryEvent::MemoryRejected {
                    proposal_id: rejected.proposal_id.clone(),
                    memory_id: rejected.memory_item.id.clone(),
                    rejected_by: actor_id,
                });
                obs::emit_proposal_decided(
                    &rejected.proposal_id,
                    rejected.status.as_str(),
                    rejected.approvals.len(),
                );
            }
            AgreementAction::Approve => {
                let (updated, recorded) = self.proposals.record_approval(proposal_id, &actor_id)?;
                sink.push(MemoryEvent::MemoryApprovalRecorded {
                    proposal_id: updated.proposal_id.clone(),
                    actor_id: actor_id.clone(),
                    recorded,
                    approval_count: updated.approvals.len(),
                    approval_count_required: updated.approval_count_required,
                });
                let owner_approves = updated.owner_override && level == TrustLevel::Owner;
                if !(updated.quorum_reached() || owner_approves) {
                    return Ok(());
                }
                let phase = self.ensure_phase(&team_key, None, "agreement", sink);
                let approved = self.proposals.approve(proposal_id, &phase.phase_id)?;
                sink.push(MemoryEvent::MemoryApproved {
                    proposal_id: approved.proposal_id.clone(),
                    memory_id: approved.memory_item.id.clone(),
                    approved_by: approved.approvals.clone(),
                });
                obs::emit_proposal_decided(
                    &approved.proposal_id,
                    approved.status.as_str(),
                    approved.approvals.len(),
                );

                let meta = ItemMeta::new(&phase.phase_id, Space::Project, Lane::Team, &space_ctx.project_id);
                if approved.is_rule() {
                    self.install_rule(&approved, meta, &team_key, links, sink);
                } else {
                    self.promote_to_team(&approved, meta, &team_key, links, sink);
                }
            }
        }
        Ok(())
    }

    fn install_rule(
        &mut self,
        approved: &crate::agreement::Proposal,
        mut meta: ItemMeta,
        team_key: &str,
        links: &mut LinkTracker,
        sink: &mut TraceSink,
    ) {
        let pending = &approved.memory_item;
        let (priority, created_by) = pending
            .meta
            .rule
            .as_ref()
            .map(|r| (r.priority, r.created_by.clone()))
            .unwrap_or((0, approved.proposed_by.clone()));
        meta.proposal_id = Some(approved.proposal_id.clone());
        meta.agreement_status = Some(approved.status);
        let item = build_rule_item(
            &mut self.factory,
            team_key,
            &pending.text,
            meta,
            RuleStatus::Active,
            priority,
            &created_by,
        );
        let outcome = self.commit(item, links);
        if outcome.is_new {
            sink.push(MemoryEvent::write(&outcome.stored, "rule_approved"));
        }
        sink.push(MemoryEvent::MemoryRuleChanged {
            rule_id: outcome.stored.id.clone(),
            rule_text: outcome.stored.text.clone(),
            proposal_id: approved.proposal_id.clone(),
            change: "added".to_string(),
        });
        let rules = self.team_rules();
        sink.push(MemoryEvent::rules_snapshot(&self.ctx.team_id, &rules));
    }

    fn promote_to_team(
        &mut self,
        approved: &crate::agreement::Proposal,
        base: ItemMeta,
        team_key: &str,
        links: &mut LinkTracker,
        sink: &mut TraceSink,
    ) {
        let source = &approved.memory_item;
        let mut meta = base
            .with_event_type(source.meta.event_type)
            .with_agent(None);
        meta.dedup_key = source.meta.dedup_key.clone();
        meta.key = source.meta.key.clone();
        meta.promoted_from = Some(source.id.clone());
        meta.promotion_reason = Some(approved.reason_code.clone());
        meta.proposal_id = Some(approved.proposal_id.clone());
        meta.agreement_status = Some(approved.status);
        let copy = self
            .factory
            .create(team_key, source.kind, source.text.clone(), source.source, meta);
        let phase_id = copy.meta.phase_id.clone();
        let outcome = self.commit(copy, links);
        if !outcome.is_new {
            return;
        }
        sink.push(MemoryEvent::write(&outcome.stored, "promoted"));
        links.add_link(
            &mut self.stores,
            &outcome.stored.id,
            Link::new(LinkType::PromotedFrom, &source.id, "agreement", &phase_id),
            Some(&source.text),
        );
        self.report_deletions(&outcome.deleted, Some(&outcome.stored.id), sink);
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    /// Start a new phase for the caller's key in `space` and `lane`,
    /// regardless of the current token.
    pub fn advance_phase(
        &mut self,
        call: &CallContext<'_>,
        space: Space,
        lane: Lane,
        request: &PhaseRequest,
    ) -> Vec<MemoryTrace> {
        let space_ctx = self.space_context(call);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        let agent = if lane == Lane::Agent { call.agent_id } else { None };
        let store_key = space_ctx.store_key_for(space, lane, agent);
        let tick = self.factory.clock().current();
        let phase = self.phases.advance(
            &store_key,
            Some(&request.token),
            request.name.as_deref(),
            request.reason.as_deref().unwrap_or("manual"),
            tick,
        );
        self.record_phase_start(&phase, &mut sink);
        sink.into_traces()
    }

    /// Compare two phases of one store key and link replaced pairs.
    pub(crate) fn phase_diff_events(
        &mut self,
        space_ctx: &SpaceContext,
        agent_id: Option<&str>,
        request: &DiffRequest,
        links: &mut LinkTracker,
        sink: &mut TraceSink,
    ) {
        let space = request.space.unwrap_or(Space::Session);
        let lane = request.lane.unwrap_or(Lane::Agent);
        let agent = if lane == Lane::Agent { agent_id } else { None };
        let store_key = space_ctx.store_key_for(space, lane, agent);
        let diff = diff_phases(
            &self.ledger,
            &store_key,
            &request.from_phase_id,
            &request.to_phase_id,
        );
        sink.push(MemoryEvent::phase_diff(&diff));
        for (before, after) in &diff.replaced {
            links.add_link(
                &mut self.stores,
                &after.memory_id,
                Link::new(LinkType::Replaced, &before.memory_id, "phase_diff", &diff.to_phase_id),
                Some(&before.preview),
            );
        }
        if lane == Lane::Team {
            let phase_ids = phase_ids_between(
                &self.ledger,
                &store_key,
                &request.from_phase_id,
                &request.to_phase_id,
            );
            let counts = self.proposals.counts_for_phases(&self.ctx.team_id, &phase_ids);
            sink.push(MemoryEvent::agreement_summary(
                &self.ctx.team_id,
                &request.from_phase_id,
                &request.to_phase_id,
                &agreement_summary(counts),
            ));
        }
    }

    // ------------------------------------------------------------------
    // Impact
    // ------------------------------------------------------------------

    /// One `memory_impact` per depth up to the limit, then a change preview
    /// when a change kind is named.
    pub(crate) fn impact_events(&self, request: &ImpactRequest, sink: &mut TraceSink) {
        let config = &self.ctx.config;
        let depth_limit = request.depth_limit.unwrap_or(config.impact_depth);
        let max_items = request.max_items.unwrap_or(config.impact_max_items);
        for depth in 1..=depth_limit {
            let result = compute_impact(&self.stores, &request.memory_id, depth, max_items);
            sink.push(MemoryEvent::MemoryImpact {
                memory_id: request.memory_id.clone(),
                depth_used: depth,
                item_count: result.items.len(),
                lines: render_impact(&result, depth),
            });
        }
        if let Some(change_kind) = &request.change_kind {
            let result = compute_impact(
                &self.stores,
                &request.memory_id,
                config.preview_depth,
                config.preview_max_items,
            );
            sink.push(MemoryEvent::MemoryChangePreview {
                memory_id: request.memory_id.clone(),
                change_kind: change_kind.clone(),
                lines: render_change_preview(&result, change_kind),
            });
        }
    }

    // ------------------------------------------------------------------
    // Event helpers
    // ------------------------------------------------------------------

    pub(crate) fn report_deletions(
        &self,
        deleted: &[crate::store::Deletion],
        replaced_by: Option<&str>,
        sink: &mut TraceSink,
    ) {
        for deletion in deleted {
            sink.push(MemoryEvent::deleted(&deletion.item, deletion.reason, replaced_by));
        }
    }

    /// `memory_links` and `memory_path` for every item whose links changed.
    pub(crate) fn emit_link_events(&self, links: &LinkTracker, sink: &mut TraceSink) {
        for item in links.updated_items(&self.stores).values() {
            sink.push(MemoryEvent::links(item));
            sink.push(MemoryEvent::path(item));
        }
    }
}
