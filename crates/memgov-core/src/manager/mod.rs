//! The memory manager: the single owner of stores, phases, proposals and
//! handoff packets.
//!
//! Every public operation takes a [`CallContext`] (profile, state, identity,
//! optional agent) and returns the trace events it produced. Governed
//! actions run in a fixed order and stop at the first denial:
//!
//! 1. resolve trust rules (config, then a state override gated by
//!    `change_rules`)
//! 2. load the team's active rules
//! 3. enforce the rules, one `memory_rule_applied` per governing rule
//! 4. the trust check, one `memory_trust_check`
//! 5. the action itself
//!
//! A denial is never an error. It is reported in the events and the action
//! is skipped. Errors are reserved for malformed requests, unknown ids and
//! illegal status transitions, and are raised before anything is mutated.

pub mod governance;
pub mod handoff;
pub mod recall;
pub mod record;

pub use governance::RuleProposal;
pub use handoff::{HandoffOutcome, HandoffRequest};
pub use recall::{RecallContext, RecallMeta, RecallOutcome};
pub use record::{Interaction, RecordOutcome, ToolEvent};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agreement::{Proposal, ProposalStore};
use crate::config::{AgentProfile, GovernanceConfig, GovernanceContext};
use crate::events::{MemoryEvent, TraceSink};
use crate::handoff::{HandoffPacket, HandoffStore};
use crate::impact::{compute_impact, ImpactResult};
use crate::item::{EventType, MemoryItem, MemoryKind};
use crate::links::LinkTracker;
use crate::metrics::METRICS;
use crate::obs;
use crate::phase::{Phase, PhaseLedger, PhaseRegistry, PhaseRequest, PhaseSnapshot};
use crate::rules::{active_rules_for_scope, enforce_action, Rule, RuleAction};
use crate::scope::{Lane, Space, SpaceContext};
use crate::state::{self, StateMap};
use crate::store::{commit_item, CommitOutcome, MemoryCounts, MemoryItemFactory, MemoryStores};
use crate::trust::{can_change_rules, Identity, TrustDecision, TrustLevel, TrustRules};

/// Proposal and packet ids that mean "pick the first pending one".
pub fn is_auto_id(id: &str) -> bool {
    matches!(id.trim(), "" | "auto" | "first_pending")
}

/// Everything a caller supplies besides the operation's own arguments.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub profile: &'a AgentProfile,
    pub state: &'a StateMap,
    pub identity: &'a Identity,
    pub agent_id: Option<&'a str>,
}

impl<'a> CallContext<'a> {
    pub fn new(profile: &'a AgentProfile, state: &'a StateMap, identity: &'a Identity) -> Self {
        Self {
            profile,
            state,
            identity,
            agent_id: None,
        }
    }

    pub fn with_agent(mut self, agent_id: Option<&'a str>) -> Self {
        self.agent_id = agent_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// The identity's id, or `requested_by` when the identity is anonymous.
    pub(crate) fn actor_id(&self, requested_by: Option<&str>) -> String {
        let actor = self.identity.actor_id();
        match requested_by.map(str::trim).filter(|r| !r.is_empty()) {
            Some(requested) if actor == "anonymous" => requested.to_string(),
            _ => actor,
        }
    }
}

/// Cache version of one (store key, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVersion {
    pub store_key: String,
    pub kind: MemoryKind,
    pub version: u64,
}

/// Trust table in force for one call.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedTrust {
    pub rules: TrustRules,
    pub overridden: bool,
}

/// Outcome of the rule and trust gate for one action.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gate {
    pub allowed: bool,
    pub required_approvals: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MemoryManager {
    ctx: GovernanceContext,
    stores: MemoryStores,
    factory: MemoryItemFactory,
    phases: PhaseRegistry,
    ledger: PhaseLedger,
    proposals: ProposalStore,
    handoffs: HandoffStore,
    cache_versions: BTreeMap<(String, MemoryKind), u64>,
}

impl MemoryManager {
    pub fn new(ctx: GovernanceContext) -> Self {
        Self {
            ctx,
            stores: MemoryStores::new(),
            factory: MemoryItemFactory::new(),
            phases: PhaseRegistry::new(),
            ledger: PhaseLedger::new(),
            proposals: ProposalStore::new(),
            handoffs: HandoffStore::new(),
            cache_versions: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &GovernanceContext {
        &self.ctx
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.ctx.config
    }

    pub fn team_id(&self) -> &str {
        &self.ctx.team_id
    }

    pub fn stores(&self) -> &MemoryStores {
        &self.stores
    }

    pub fn phases(&self) -> &PhaseRegistry {
        &self.phases
    }

    pub fn ledger(&self) -> &PhaseLedger {
        &self.ledger
    }

    pub fn get_item(&self, id: &str) -> Option<&MemoryItem> {
        self.stores.get(id)
    }

    pub fn memory_counts(&self) -> MemoryCounts {
        self.stores.counts()
    }

    pub fn phase_snapshot(&self) -> Vec<PhaseSnapshot> {
        self.phases.snapshot()
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Every proposal of `team_id`, in creation order.
    pub fn list_team_proposals(&self, team_id: &str) -> Vec<Proposal> {
        self.proposals.list(team_id).into_iter().cloned().collect()
    }

    pub fn get_handoff_packet(&self, packet_id: &str) -> Option<&HandoffPacket> {
        self.handoffs.get(packet_id)
    }

    /// Every packet of `team_id`, in creation order.
    pub fn list_handoff_packets(&self, team_id: &str) -> Vec<HandoffPacket> {
        self.handoffs.list_packets(team_id).into_iter().cloned().collect()
    }

    pub fn first_pending_packet(&self, team_id: &str) -> Option<&HandoffPacket> {
        self.handoffs.first_pending(team_id)
    }

    /// Active team rules: configured defaults plus approved rule items.
    pub fn team_rules(&self) -> Vec<Rule> {
        let team_key = self.team_store_key();
        active_rules_for_scope(&self.stores.semantic, &team_key, &self.ctx.config.default_rules)
    }

    /// Read-only impact analysis rooted at `memory_id`.
    pub fn compute_impact(
        &self,
        memory_id: &str,
        depth_limit: usize,
        max_items: usize,
    ) -> ImpactResult {
        compute_impact(&self.stores, memory_id, depth_limit, max_items)
    }

    // ------------------------------------------------------------------
    // Cache versions
    // ------------------------------------------------------------------

    /// Version of the (store key, kind) pair; 0 when never written.
    pub fn cache_version(&self, store_key: &str, kind: MemoryKind) -> u64 {
        self.cache_versions
            .get(&(store_key.to_string(), kind))
            .copied()
            .unwrap_or(0)
    }

    /// Every non-zero cache version, sorted by store key then kind.
    pub fn cache_versions(&self) -> Vec<CacheVersion> {
        self.cache_versions
            .iter()
            .map(|((store_key, kind), version)| CacheVersion {
                store_key: store_key.clone(),
                kind: *kind,
                version: *version,
            })
            .collect()
    }

    fn bump_cache(&mut self, store_key: &str, kind: MemoryKind) {
        *self
            .cache_versions
            .entry((store_key.to_string(), kind))
            .or_insert(0) += 1;
    }

    // ------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------

    pub(crate) fn space_context(&self, call: &CallContext<'_>) -> SpaceContext {
        SpaceContext::resolve(call.state, call.identity, &self.ctx)
    }

    /// Team lane of the project space, where rules and approved items live.
    pub(crate) fn team_store_key(&self) -> String {
        crate::scope::store_key_for(Space::Project, Lane::Team, &self.ctx.project_id(), None)
    }

    /// Current phase of `store_key`, starting one (and reporting it) when
    /// needed.
    pub(crate) fn ensure_phase(
        &mut self,
        store_key: &str,
        request: Option<&PhaseRequest>,
        default_reason: &str,
        sink: &mut TraceSink,
    ) -> Phase {
        let tick = self.factory.clock().current();
        let (phase, started) = self.phases.ensure_phase(store_key, request, default_reason, tick);
        if started {
            self.record_phase_start(&phase, sink);
        }
        phase
    }

    pub(crate) fn record_phase_start(&mut self, phase: &Phase, sink: &mut TraceSink) {
        let previous = self.phases.history(&phase.store_key).last().cloned();
        self.ledger.start_phase(phase, previous.as_ref());
        sink.push(MemoryEvent::phase_started(phase, previous.as_ref()));
        obs::emit_phase_started(&phase.store_key, &phase.phase_id, &phase.reason);
    }

    /// Commit through dedupe and conflict resolution, bumping cache
    /// versions for every store touched.
    pub(crate) fn commit(&mut self, item: MemoryItem, links: &mut LinkTracker) -> CommitOutcome {
        let policy = self.ctx.config.commit_policy();
        let outcome = commit_item(&mut self.stores, &mut self.ledger, links, item, &policy);
        if outcome.is_new {
            self.bump_cache(&outcome.stored.store_key, outcome.stored.kind);
        }
        for deletion in &outcome.deleted {
            self.bump_cache(&deletion.item.store_key, deletion.item.kind);
        }
        outcome
    }

    /// Remove a stored item, recording the delete in its phase.
    pub(crate) fn remove_item(&mut self, item: &MemoryItem) -> Option<MemoryItem> {
        let removed = self.stores.delete_item(item.kind, &item.store_key, &item.id)?;
        self.ledger
            .record_delete(&removed.store_key, &removed.meta.phase_id, &removed.id);
        self.bump_cache(&removed.store_key, removed.kind);
        Some(removed)
    }

    /// Configured trust table, overlaid by the state's trust rules when the
    /// caller may change rules.
    pub(crate) fn resolve_trust(&self, call: &CallContext<'_>, sink: &mut TraceSink) -> ResolvedTrust {
        let base = self.ctx.config.trust.clone();
        let Some(value) = state::trust_rules_override(call.state) else {
            return ResolvedTrust {
                rules: base,
                overridden: false,
            };
        };
        let actor_id = call.actor_id(None);
        let decision = can_change_rules(call.identity.level(), &base).with_actor(&actor_id);
        sink.push(MemoryEvent::trust_check(&decision));
        if !decision.allowed {
            obs::emit_denied("change_rules", &actor_id, &decision.reason);
            METRICS.inc_denials();
            return ResolvedTrust {
                rules: base,
                overridden: false,
            };
        }
        match base.overlay(value) {
            Some(rules) => {
                sink.push(MemoryEvent::trust_rules(&self.ctx.team_id, "state", &rules));
                ResolvedTrust {
                    rules,
                    overridden: true,
                }
            }
            None => ResolvedTrust {
                rules: base,
                overridden: false,
            },
        }
    }

    /// Rule enforcement followed by the trust check.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn gate(
        &self,
        rules: &[Rule],
        action: RuleAction,
        actor_level: TrustLevel,
        actor_id: &str,
        trust: &TrustRules,
        event_type: EventType,
        sink: &mut TraceSink,
    ) -> Gate {
        let check = enforce_action(rules, action, actor_level, event_type);
        for applied in &check.applied {
            sink.push(MemoryEvent::rule_applied(applied));
        }
        if !check.allowed {
            let reason = check.denial_reason().unwrap_or("denied by rule");
            obs::emit_denied(action.as_str(), actor_id, reason);
            METRICS.inc_denials();
            return Gate {
                allowed: false,
                required_approvals: check.required_approvals,
            };
        }
        let decision = TrustDecision::evaluate(action, actor_level, trust).with_actor(actor_id);
        sink.push(MemoryEvent::trust_check(&decision));
        if !decision.allowed {
            obs::emit_denied(action.as_str(), actor_id, &decision.reason);
            METRICS.inc_denials();
        }
        Gate {
            allowed: decision.allowed,
            required_approvals: check.required_approvals,
        }
    }
}
