//! Recording one interaction.
//!
//! Write order for a turn:
//!
//! 1. ensure the session phase (a state phase token may start a new one)
//! 2. resolve trust and apply a state-driven agreement request
//! 3. user and AI turns into short-term memory, then summarization
//! 4. durable user statements into semantic memory, facts into profile
//! 5. tool events as one execution item linked to its tool calls
//! 6. promotion of this turn's durable items
//! 7. a requested phase diff, then link and impact reports

use serde::{Deserialize, Serialize};

use super::{CallContext, MemoryManager, ResolvedTrust};
use crate::agreement::{AgreementAction, AgreementRequest, ProposalDraft};
use crate::error::Result;
use crate::events::{MemoryEvent, MemoryTrace, TraceSink};
use crate::facts::{
    classify_event_type, extract_fact, infer_promotion_request, should_write_semantic,
    PromotionRequest,
};
use crate::impact::{impact_of_item, render_change_preview};
use crate::item::{Authority, EventType, ItemMeta, MemoryItem, MemoryKind};
use crate::links::{Link, LinkTracker, LinkType};
use crate::metrics::METRICS;
use crate::obs;
use crate::phase::Phase;
use crate::rules::{enforce_action, merge_required_approvals};
use crate::scope::{Lane, Space, SpaceContext};
use crate::state;
use crate::store::{DeletionReason, SummaryOutcome};
use crate::trust::{TrustAction, TrustLevel};

/// One tool event reported by the interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ToolEvent {
    pub fn call(name: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            kind: "call".to_string(),
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn result(name: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            kind: "result".to_string(),
            ..Self::call(name, tool_call_id)
        }
    }

    fn label(&self) -> String {
        format!("{} {}", self.kind, self.name.as_deref().unwrap_or("tool"))
    }
}

/// One user turn and the AI's answer.
#[derive(Debug, Clone, Copy)]
pub struct Interaction<'a> {
    pub user_input: &'a str,
    pub ai_output: &'a str,
    pub tool_events: &'a [ToolEvent],
}

impl<'a> Interaction<'a> {
    pub fn new(user_input: &'a str, ai_output: &'a str) -> Self {
        Self {
            user_input,
            ai_output,
            tool_events: &[],
        }
    }

    pub fn with_tool_events(mut self, tool_events: &'a [ToolEvent]) -> Self {
        self.tool_events = tool_events;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Items written by the call that are still stored, sorted by id.
    pub written: Vec<MemoryItem>,
    pub events: Vec<MemoryTrace>,
}

/// Per-call state threaded through the write steps.
struct Turn<'c> {
    space_ctx: SpaceContext,
    phase: Phase,
    agent_id: Option<&'c str>,
    home_key: String,
    links: LinkTracker,
    sink: TraceSink,
    written: Vec<String>,
}

impl Turn<'_> {
    fn meta(&self, event_type: EventType) -> ItemMeta {
        ItemMeta::new(
            &self.phase.phase_id,
            Space::Session,
            Lane::Agent,
            &self.space_ctx.session_id,
        )
        .with_agent(self.agent_id)
        .with_event_type(event_type)
    }
}

impl MemoryManager {
    /// Record one interaction and report everything that happened.
    pub fn record_interaction_with_events(
        &mut self,
        call: &CallContext<'_>,
        interaction: &Interaction<'_>,
    ) -> Result<RecordOutcome> {
        // Requests that can fail are resolved before anything is written.
        let agreement = match state::agreement_request(call.state) {
            Some(request) => self
                .select_proposal(&request)?
                .map(|proposal_id| (request, proposal_id)),
            None => None,
        };

        let space_ctx = self.space_context(call);
        let _span = obs::SessionSpan::enter(&space_ctx.session_id);
        let mut sink = TraceSink::new(&call.profile.name, &space_ctx.session_id);
        let home_key = space_ctx.store_key_for(Space::Session, Lane::Agent, call.agent_id);
        let phase_request = state::phase_request(call.state);
        let phase = self.ensure_phase(&home_key, phase_request.as_ref(), "auto", &mut sink);
        let mut turn = Turn {
            space_ctx,
            phase,
            agent_id: call.agent_id,
            home_key,
            links: LinkTracker::new(self.ctx.config.max_links),
            sink,
            written: Vec::new(),
        };

        let trust = self.resolve_trust(call, &mut turn.sink);
        if let Some((request, proposal_id)) = agreement {
            self.state_agreement(call, &trust, &request, &proposal_id, &mut turn)?;
        }

        let has_tools = !interaction.tool_events.is_empty();
        let user_type = classify_event_type(interaction.user_input, has_tools);
        let promotion = infer_promotion_request(interaction.user_input);
        let user_turn_id = self.write_turns(call, interaction, user_type, &mut turn);
        self.write_durable_statements(
            call,
            interaction,
            user_type,
            promotion.as_ref(),
            user_turn_id,
            &mut turn,
        );
        if has_tools && call.profile.memory.semantic {
            self.write_tool_events(interaction, &mut turn);
        }
        if let Some(request) = &promotion {
            self.promote_turn_items(call, &trust, request, &mut turn)?;
        }

        if let Some(diff) = state::diff_request(call.state) {
            self.phase_diff_events(
                &turn.space_ctx,
                call.agent_id,
                &diff,
                &mut turn.links,
                &mut turn.sink,
            );
        }
        self.emit_link_events(&turn.links, &mut turn.sink);
        if let Some(request) = state::impact_request(call.state) {
            self.impact_events(&request, &mut turn.sink);
        }

        let mut written: Vec<MemoryItem> = turn
            .written
            .iter()
            .filter_map(|id| self.stores.get(id).cloned())
            .collect();
        written.sort_by(|a, b| a.id.cmp(&b.id));
        written.dedup_by(|a, b| a.id == b.id);

        METRICS.inc_records();
        METRICS.add_items_written(written.len() as u64);
        obs::emit_record(&turn.space_ctx.session_id, written.len(), turn.sink.len());
        Ok(RecordOutcome {
            written,
            events: turn.sink.into_traces(),
        })
    }

    fn state_agreement(
        &mut self,
        call: &CallContext<'_>,
        trust: &ResolvedTrust,
        request: &AgreementRequest,
        proposal_id: &str,
        turn: &mut Turn<'_>,
    ) -> Result<()> {
        let space_ctx = turn.space_ctx.clone();
        self.decide_proposal(
            call,
            &space_ctx,
            trust,
            proposal_id,
            request.action,
            request.requested_by.as_deref(),
            &mut turn.links,
            &mut turn.sink,
        )
    }

    /// Short-term writes and summarization. Returns the user turn's id.
    fn write_turns(
        &mut self,
        call: &CallContext<'_>,
        interaction: &Interaction<'_>,
        user_type: EventType,
        turn: &mut Turn<'_>,
    ) -> Option<String> {
        let max_turns = call.profile.memory.short_term;
        if max_turns == 0 {
            return None;
        }
        let mut user_turn_id = None;
        let turns = [
            (interaction.user_input, Authority::User, user_type, "user_turn"),
            (interaction.ai_output, Authority::Ai, EventType::Context, "ai_turn"),
        ];
        for (text, source, event_type, reason) in turns {
            if text.trim().is_empty() {
                continue;
            }
            let item = self.factory.create(
                &turn.home_key,
                MemoryKind::ShortTerm,
                text,
                source,
                turn.meta(event_type),
            );
            let outcome = self.commit(item, &mut turn.links);
            turn.sink.push(MemoryEvent::write(&outcome.stored, reason));
            if source == Authority::User {
                user_turn_id = Some(outcome.stored.id.clone());
            }
            turn.written.push(outcome.stored.id);
        }

        let summary = self.stores.short_term.summarize_if_needed(
            &mut self.factory,
            &turn.home_key,
            max_turns,
            turn.meta(EventType::Summary),
        );
        self.apply_summary(summary, turn);
        user_turn_id
    }

    fn apply_summary(&mut self, outcome: SummaryOutcome, turn: &mut Turn<'_>) {
        let Some(summary) = outcome.summary else {
            return;
        };
        for evicted in &outcome.evicted {
            self.ledger
                .record_delete(&evicted.store_key, &evicted.meta.phase_id, &evicted.id);
            self.bump_cache(&evicted.store_key, evicted.kind);
            turn.sink.push(MemoryEvent::deleted(
                evicted,
                DeletionReason::Expired,
                Some(&summary.id),
            ));
        }
        if let Some(previous) = &outcome.replaced_summary {
            self.ledger
                .record_delete(&previous.store_key, &previous.meta.phase_id, &previous.id);
            self.bump_cache(&previous.store_key, previous.kind);
            turn.sink.push(MemoryEvent::deleted(
                previous,
                DeletionReason::Replaced,
                Some(&summary.id),
            ));
        }
        self.ledger
            .record_add(&summary.store_key, &summary.meta.phase_id, &summary);
        self.bump_cache(&summary.store_key, summary.kind);
        turn.sink.push(MemoryEvent::write(&summary, "summary"));
        if let Some(previous) = &outcome.replaced_summary {
            turn.links.add_link(
                &mut self.stores,
                &summary.id,
                Link::new(LinkType::Replaced, &previous.id, "summary", &summary.meta.phase_id),
                Some(&previous.text),
            );
        }
        turn.written.push(summary.id);
    }

    /// Semantic item for a durable user statement, profile item for a fact.
    fn write_durable_statements(
        &mut self,
        call: &CallContext<'_>,
        interaction: &Interaction<'_>,
        user_type: EventType,
        promotion: Option<&PromotionRequest>,
        user_turn_id: Option<String>,
        turn: &mut Turn<'_>,
    ) {
        let memory = call.profile.memory;
        let text = interaction.user_input.trim();
        if text.is_empty() {
            return;
        }
        let fact = extract_fact(text);

        if memory.semantic && should_write_semantic(user_type, promotion) {
            let mut meta = turn.meta(user_type);
            if let Some(fact) = &fact {
                meta = meta.with_dedup_key(fact.dedup_key());
            }
            if let Some(request) = promotion {
                meta.promotion_target = Some(request.target_space);
                meta.promotion_reason = Some(request.reason.clone());
            }
            let item = self
                .factory
                .create(&turn.home_key, MemoryKind::Semantic, text, Authority::User, meta);
            self.write_durable(item, "semantic", turn);
        }

        if memory.profile {
            if let Some(fact) = fact {
                let event_type = if user_type == EventType::Correction {
                    EventType::Correction
                } else {
                    EventType::Fact
                };
                let mut meta = turn.meta(event_type).with_dedup_key(fact.dedup_key());
                meta.key = Some(fact.key.clone());
                meta.source_turn_ids = user_turn_id.into_iter().collect();
                let item = self.factory.create(
                    &turn.home_key,
                    MemoryKind::Profile,
                    fact.value,
                    Authority::User,
                    meta,
                );
                self.write_durable(item, "profile_fact", turn);
            }
        }
    }

    /// Commit a semantic or profile item and report it, along with any
    /// conflict loser it displaced. Returns the item when it is new.
    fn write_durable(
        &mut self,
        item: MemoryItem,
        reason: &str,
        turn: &mut Turn<'_>,
    ) -> Option<MemoryItem> {
        let outcome = self.commit(item, &mut turn.links);
        if outcome.is_new {
            turn.sink.push(MemoryEvent::write(&outcome.stored, reason));
            turn.written.push(outcome.stored.id.clone());
        }
        let replaced_by = outcome.is_new.then_some(outcome.stored.id.as_str());
        let (depth, max_items) = (
            self.ctx.config.preview_depth,
            self.ctx.config.preview_max_items,
        );
        for deletion in &outcome.deleted {
            let preview = impact_of_item(&self.stores, &deletion.item, depth, max_items);
            turn.sink.push(MemoryEvent::MemoryChangePreview {
                memory_id: deletion.item.id.clone(),
                change_kind: "replace".to_string(),
                lines: render_change_preview(&preview, "replace"),
            });
            turn.sink
                .push(MemoryEvent::deleted(&deletion.item, deletion.reason, replaced_by));
        }
        outcome.is_new.then_some(outcome.stored)
    }

    /// One execution item summarizing the tool events, linked to each call.
    fn write_tool_events(&mut self, interaction: &Interaction<'_>, turn: &mut Turn<'_>) {
        let labels: Vec<String> = interaction.tool_events.iter().map(ToolEvent::label).collect();
        let text = format!("Tool events: {}.", labels.join(", "));
        let item = self.factory.create(
            &turn.home_key,
            MemoryKind::Semantic,
            text,
            Authority::Tool,
            turn.meta(EventType::Execution),
        );
        let Some(stored) = self.write_durable(item, "tool_events", turn) else {
            return;
        };
        for event in interaction.tool_events.iter().filter(|e| e.kind == "call") {
            let Some(call_id) = event.tool_call_id.as_deref() else {
                continue;
            };
            let link = Link::new(LinkType::CausedBy, call_id, "tool_call", &turn.phase.phase_id)
                .with_source_event(call_id);
            turn.links.add_link(
                &mut self.stores,
                &stored.id,
                link,
                Some(event.name.as_deref().unwrap_or("tool")),
            );
        }
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    fn promote_turn_items(
        &mut self,
        call: &CallContext<'_>,
        trust: &ResolvedTrust,
        request: &PromotionRequest,
        turn: &mut Turn<'_>,
    ) -> Result<()> {
        let candidates: Vec<MemoryItem> = turn
            .written
            .iter()
            .filter_map(|id| self.stores.get(id))
            .filter(|item| item.kind != MemoryKind::ShortTerm && item.meta.promoted_from.is_none())
            .cloned()
            .collect();
        for item in candidates {
            if request.needs_agreement() {
                self.propose_promotion(call, trust, request, item, turn)?;
            } else {
                self.promote_directly(request, item, turn);
            }
        }
        Ok(())
    }

    /// Team-lane promotion: a proposal holding a snapshot of the item.
    fn propose_promotion(
        &mut self,
        call: &CallContext<'_>,
        trust: &ResolvedTrust,
        request: &PromotionRequest,
        item: MemoryItem,
        turn: &mut Turn<'_>,
    ) -> Result<()> {
        let actor_id = call.actor_id(None);
        let level = call.identity.level();
        let rules = self.team_rules();
        let event_type = item.meta.event_type;
        let gate = self.gate(
            &rules,
            TrustAction::Propose,
            level,
            &actor_id,
            &trust.rules,
            event_type,
            &mut turn.sink,
        );
        if !gate.allowed {
            return Ok(());
        }
        let team_key = self.team_store_key();
        let phase = self.ensure_phase(&team_key, None, "agreement", &mut turn.sink);
        let approval_rules = enforce_action(&rules, TrustAction::Approve, level, event_type);
        let required = merge_required_approvals(
            trust.rules.required_approvals,
            gate.required_approvals.max(approval_rules.required_approvals),
        );
        let created = self.proposals.create_proposal(ProposalDraft {
            team_id: self.ctx.team_id.clone(),
            phase_id: phase.phase_id.clone(),
            memory_item: item,
            proposed_by: actor_id.clone(),
            reason_code: request.reason.clone(),
            approval_count_required: required,
            owner_override: trust.rules.owner_override,
            ai_profile: call.profile.name.clone(),
        });
        turn.sink.push(MemoryEvent::proposed(&created));

        if level == TrustLevel::Owner && trust.rules.owner_override {
            let space_ctx = turn.space_ctx.clone();
            self.decide_proposal(
                call,
                &space_ctx,
                trust,
                &created.proposal_id,
                AgreementAction::Approve,
                Some(&actor_id),
                &mut turn.links,
                &mut turn.sink,
            )?;
        }
        Ok(())
    }

    /// Private-lane promotion: copy into the target space and retire the
    /// source.
    fn promote_directly(&mut self, request: &PromotionRequest, source: MemoryItem, turn: &mut Turn<'_>) {
        let target_key =
            turn.space_ctx
                .store_key_for(request.target_space, request.target_lane, None);
        let phase = self.ensure_phase(&target_key, None, "promotion", &mut turn.sink);
        let mut meta = source.meta.clone();
        meta.links.clear();
        meta.link_preview_text.clear();
        meta.phase_id = phase.phase_id.clone();
        meta.space = request.target_space;
        meta.lane = request.target_lane;
        meta.owner = turn.space_ctx.owner_for(request.target_space).to_string();
        meta.agent_id = None;
        meta.promoted_from = Some(source.id.clone());
        meta.promotion_target = Some(request.target_space);
        meta.promotion_reason = Some(request.reason.clone());
        let copy = self
            .factory
            .create(&target_key, source.kind, source.text.clone(), source.source, meta);
        let Some(stored) = self.write_durable(copy, "promoted", turn) else {
            return;
        };
        turn.links.add_link(
            &mut self.stores,
            &stored.id,
            Link::new(LinkType::PromotedFrom, &source.id, &request.reason, &phase.phase_id),
            Some(&source.text),
        );
        if let Some(removed) = self.remove_item(&source) {
            turn.links.add_link(
                &mut self.stores,
                &stored.id,
                Link::new(LinkType::Replaced, &removed.id, "promoted", &phase.phase_id),
                Some(&removed.text),
            );
            turn.sink.push(MemoryEvent::deleted(
                &removed,
                DeletionReason::Promoted,
                Some(&stored.id),
            ));
        }
    }
}
