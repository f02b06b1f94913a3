//! Drives a [`Scenario`] through a manager and collects a [`ScenarioRun`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ScenarioError;
use super::scenario::{
    decode, given, AdminAction, AdminPayload, AgreementPayload, CreateHandoffPayload,
    ImpactPayload, PacketPayload, PhasePayload, ProposeRulePayload, RecallPayload,
    RecordPayload, Scenario, ScenarioStep, StepKind,
};
use crate::agreement::{AgreementAction, AgreementRequest};
use crate::config::GovernanceContext;
use crate::digest::digest_of;
use crate::error::Result;
use crate::events::MemoryTrace;
use crate::item::MemoryItem;
use crate::manager::{
    is_auto_id, CacheVersion, CallContext, HandoffRequest, Interaction, MemoryManager,
    RecallContext, RecallMeta, RuleProposal, ToolEvent,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::phase::PhaseSnapshot;
use crate::scope::Space;
use crate::state::{self, StateMap};
use crate::store::MemoryCounts;
use crate::trust::Identity;

/// Report of one recall step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallStep {
    pub step_index: usize,
    pub step_kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub context: RecallContext,
    pub events: Vec<MemoryTrace>,
    pub meta: RecallMeta,
    pub deterministic_hash: String,
}

/// Report of one record or admin step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteStep {
    pub step_index: usize,
    pub step_kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_events: Vec<ToolEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AdminAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// New items, sorted by id.
    pub written: Vec<MemoryItem>,
    pub events: Vec<MemoryTrace>,
}

impl WriteStep {
    fn admin(step_index: usize, action: AdminAction, payload: Value) -> Self {
        Self {
            step_index,
            step_kind: StepKind::Admin,
            input: None,
            output: None,
            tool_events: Vec::new(),
            agent_id: None,
            action: Some(action),
            payload: Some(payload),
            result: None,
            written: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub total: usize,
    pub recall: usize,
    pub record: usize,
    pub admin: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepHash {
    pub step_index: usize,
    pub deterministic_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCacheVersions {
    pub step_index: usize,
    pub versions: Vec<CacheVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPhases {
    pub step_index: usize,
    pub phases: Vec<PhaseSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub scenario: ScenarioRef,
    pub step_counts: StepCounts,
    pub memory_counts: MemoryCounts,
    pub recall_hashes: Vec<StepHash>,
    pub cache_versions_by_step: Vec<StepCacheVersions>,
    pub phase_snapshots_by_step: Vec<StepPhases>,
}

/// Everything a scenario produced, step by step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub scenario_id: String,
    pub scenario_name: String,
    pub recall_steps: Vec<RecallStep>,
    pub write_steps: Vec<WriteStep>,
    pub meta: RunMeta,
}

impl ScenarioRun {
    /// Canonical SHA-256 of the whole report.
    pub fn digest(&self) -> Result<String> {
        digest_of(self)
    }

    /// Every trace of every step, in step order.
    pub fn traces(&self) -> Vec<&MemoryTrace> {
        let mut steps: Vec<(usize, &[MemoryTrace])> = self
            .recall_steps
            .iter()
            .map(|s| (s.step_index, s.events.as_slice()))
            .chain(
                self.write_steps
                    .iter()
                    .map(|s| (s.step_index, s.events.as_slice())),
            )
            .collect();
        steps.sort_by_key(|(index, _)| *index);
        steps.into_iter().flat_map(|(_, events)| events).collect()
    }

    pub fn write_step(&self, step_index: usize) -> Option<&WriteStep> {
        self.write_steps.iter().find(|s| s.step_index == step_index)
    }

    pub fn recall_step(&self, step_index: usize) -> Option<&RecallStep> {
        self.recall_steps.iter().find(|s| s.step_index == step_index)
    }
}

/// Run `scenario` against a fresh manager.
pub fn run_scenario(scenario: &Scenario, ctx: GovernanceContext) -> Result<ScenarioRun> {
    let mut manager = MemoryManager::new(ctx);
    run_scenario_on(&mut manager, scenario)
}

/// Run `scenario` against `manager`, leaving its stores in place for
/// inspection afterwards.
pub fn run_scenario_on(manager: &mut MemoryManager, scenario: &Scenario) -> Result<ScenarioRun> {
    scenario.validate()?;
    obs::emit_scenario_started(&scenario.scenario_id, scenario.steps.len());

    let mut runner = Runner {
        manager,
        scenario,
        state: scenario.initial_state.clone(),
    };
    let mut recall_steps = Vec::new();
    let mut write_steps = Vec::new();
    let mut counts = StepCounts {
        total: scenario.steps.len(),
        ..StepCounts::default()
    };
    let mut recall_hashes = Vec::new();
    let mut cache_versions_by_step = Vec::new();
    let mut phase_snapshots_by_step = Vec::new();

    for (offset, step) in scenario.steps.iter().enumerate() {
        let step_index = offset + 1;
        let kind = StepKind::parse(&step.kind).ok_or_else(|| ScenarioError::UnknownStepKind {
            step_index,
            kind: step.kind.clone(),
        })?;
        match kind {
            StepKind::Recall => {
                let recall = runner.recall(step_index, step)?;
                recall_hashes.push(StepHash {
                    step_index,
                    deterministic_hash: recall.deterministic_hash.clone(),
                });
                recall_steps.push(recall);
                counts.recall += 1;
            }
            StepKind::Record => {
                write_steps.push(runner.record(step_index, step)?);
                counts.record += 1;
            }
            StepKind::Admin => {
                let before = item_ids(runner.manager);
                let mut admin = runner.admin(step_index, step)?;
                admin.written = new_items(runner.manager, &before);
                write_steps.push(admin);
                counts.admin += 1;
            }
        }
        cache_versions_by_step.push(StepCacheVersions {
            step_index,
            versions: runner.manager.cache_versions(),
        });
        phase_snapshots_by_step.push(StepPhases {
            step_index,
            phases: runner.manager.phase_snapshot(),
        });
    }

    let run = ScenarioRun {
        scenario_id: scenario.scenario_id.clone(),
        scenario_name: scenario.name.clone(),
        recall_steps,
        write_steps,
        meta: RunMeta {
            scenario: ScenarioRef {
                id: scenario.scenario_id.clone(),
                name: scenario.name.clone(),
            },
            step_counts: counts,
            memory_counts: runner.manager.memory_counts(),
            recall_hashes,
            cache_versions_by_step,
            phase_snapshots_by_step,
        },
    };
    let digest = run.digest()?;
    obs::emit_scenario_finished(&run.scenario_id, run.traces().len(), &digest);
    METRICS.flush();
    Ok(run)
}

fn item_ids(manager: &MemoryManager) -> BTreeSet<String> {
    manager.stores().all_items().map(|i| i.id.clone()).collect()
}

fn new_items(manager: &MemoryManager, before: &BTreeSet<String>) -> Vec<MemoryItem> {
    let mut added: Vec<MemoryItem> = manager
        .stores()
        .all_items()
        .filter(|i| !before.contains(&i.id))
        .cloned()
        .collect();
    added.sort_by(|a, b| a.id.cmp(&b.id));
    added
}

struct Runner<'m, 's> {
    manager: &'m mut MemoryManager,
    scenario: &'s Scenario,
    /// Carried across steps; `advance_phase` writes the reserved keys.
    state: StateMap,
}

impl Runner<'_, '_> {
    fn identity<'a>(&'a self, step: &'a ScenarioStep) -> &'a Identity {
        step.identity.as_ref().unwrap_or(&self.scenario.identity)
    }

    fn recall(&self, step_index: usize, step: &ScenarioStep) -> Result<RecallStep> {
        let payload: RecallPayload = decode(step_index, &step.payload)?;
        let agent_id = given(payload.agent_id);
        let call = CallContext::new(&self.scenario.ai_profile, &self.state, self.identity(step))
            .with_agent(agent_id.as_deref());
        let outcome = self.manager.recall_context_with_events(&call)?;
        Ok(RecallStep {
            step_index,
            step_kind: StepKind::Recall,
            input: payload.input,
            agent_id,
            deterministic_hash: outcome.meta.recall_hash.clone(),
            context: outcome.context,
            events: outcome.events,
            meta: outcome.meta,
        })
    }

    fn record(&mut self, step_index: usize, step: &ScenarioStep) -> Result<WriteStep> {
        let payload: RecordPayload = decode(step_index, &step.payload)?;
        let agent_id = given(payload.agent_id);
        let input = payload.input.unwrap_or_default();
        let output = payload.output.unwrap_or_default();
        let identity = step.identity.as_ref().unwrap_or(&self.scenario.identity);
        let call = CallContext::new(&self.scenario.ai_profile, &self.state, identity)
            .with_agent(agent_id.as_deref());
        let interaction = Interaction::new(&input, &output).with_tool_events(&payload.tool_events);
        let outcome = self.manager.record_interaction_with_events(&call, &interaction)?;
        Ok(WriteStep {
            step_index,
            step_kind: StepKind::Record,
            input: Some(input),
            output: Some(output),
            tool_events: payload.tool_events,
            agent_id,
            action: None,
            payload: None,
            result: None,
            written: outcome.written,
            events: outcome.events,
        })
    }

    fn admin(&mut self, step_index: usize, step: &ScenarioStep) -> Result<WriteStep> {
        let AdminPayload { action, payload } = decode(step_index, &step.payload)?;
        let action = given(action).ok_or_else(|| ScenarioError::missing(step_index, "action"))?;
        let action = AdminAction::parse(&action).ok_or(ScenarioError::UnknownAdminAction {
            step_index,
            action,
        })?;
        let identity = step.identity.as_ref().unwrap_or(&self.scenario.identity);
        let call = CallContext::new(&self.scenario.ai_profile, &self.state, identity);
        let mut out = WriteStep::admin(step_index, action, payload.clone());

        match action {
            AdminAction::ProposeRule => {
                let p: ProposeRulePayload = decode(step_index, &payload)?;
                let text =
                    given(p.text).ok_or_else(|| ScenarioError::missing(step_index, "payload.text"))?;
                let mut proposal = RuleProposal::new(text).with_priority(p.priority);
                if let Some(actor) = given(p.requested_by) {
                    proposal = proposal.with_requested_by(actor);
                }
                out.events = self.manager.propose_rule(&call, &proposal)?;
            }
            AdminAction::ApplyAgreement => {
                let p: AgreementPayload = decode(step_index, &payload)?;
                let word = given(p.action)
                    .ok_or_else(|| ScenarioError::missing(step_index, "payload.action"))?;
                let action: AgreementAction = word.parse()?;
                let mut request = AgreementRequest {
                    action,
                    proposal_id: given(p.proposal_id).filter(|id| !is_auto_id(id)),
                    requested_by: None,
                };
                if let Some(actor) = given(p.requested_by) {
                    request = request.with_requested_by(actor);
                }
                out.events = self.manager.apply_agreement(&call, &request)?;
            }
            AdminAction::CreateHandoff => {
                let p: CreateHandoffPayload = decode(step_index, &payload)?;
                let mut request = HandoffRequest::new(
                    p.from_agent_id.unwrap_or_default(),
                    p.to_agent_id.unwrap_or_default(),
                )
                .with_space(p.space.unwrap_or(Space::Project));
                if let Some(actor) = given(p.requested_by) {
                    request = request.with_requested_by(actor);
                }
                let outcome = self.manager.create_handoff(&call, &request)?;
                out.result = outcome.packet.as_ref().map(|packet| {
                    json!({ "packet_id": packet.packet_id, "status": packet.status })
                });
                out.events = outcome.events;
            }
            AdminAction::ApplyHandoff | AdminAction::RejectHandoff => {
                let p: PacketPayload = decode(step_index, &payload)?;
                let packet_id = self
                    .packet_id(p.packet_id)
                    .ok_or_else(|| ScenarioError::missing(step_index, "payload.packet_id"))?;
                let requested_by = given(p.requested_by);
                out.events = if action == AdminAction::ApplyHandoff {
                    self.manager
                        .apply_handoff(&call, &packet_id, requested_by.as_deref())?
                } else {
                    self.manager
                        .reject_handoff(&call, &packet_id, requested_by.as_deref())?
                };
                out.result = self
                    .manager
                    .get_handoff_packet(&packet_id)
                    .map(|packet| json!({ "packet_id": packet.packet_id, "status": packet.status }));
            }
            AdminAction::ComputeImpact => {
                let p: ImpactPayload = decode(step_index, &payload)?;
                let memory_id = given(p.memory_id)
                    .ok_or_else(|| ScenarioError::missing(step_index, "payload.memory_id"))?;
                let config = self.manager.config();
                let impact = self.manager.compute_impact(
                    &memory_id,
                    p.depth_limit.unwrap_or(config.impact_depth),
                    p.max_items.unwrap_or(config.impact_max_items),
                );
                out.result = Some(serde_json::to_value(&impact)?);
            }
            AdminAction::AdvancePhase => {
                let p: PhasePayload = decode(step_index, &payload)?;
                out.result = Some(json!({
                    "state_update": self.advance_phase(step_index, p),
                }));
            }
        }
        Ok(out)
    }

    /// Explicit id, or the team's first pending packet for an auto id.
    fn packet_id(&self, requested: Option<String>) -> Option<String> {
        match given(requested) {
            Some(id) if !is_auto_id(&id) => Some(id),
            _ => self
                .manager
                .first_pending_packet(self.manager.team_id())
                .map(|packet| packet.packet_id.clone()),
        }
    }

    /// Write the phase keys into the carried state. The next record call
    /// starts the phase.
    fn advance_phase(&mut self, step_index: usize, p: PhasePayload) -> Value {
        let token = given(p.token).unwrap_or_else(|| format!("proof-phase-{step_index}"));
        self.state.insert(state::PHASE_TOKEN.into(), Value::String(token));
        let optional = [
            (state::PHASE_NAME, p.name),
            (state::PHASE_REASON, p.reason),
            (state::PHASE_DIFF_FROM, p.diff_from),
            (state::PHASE_DIFF_TO, p.diff_to),
            (state::PHASE_DIFF_SPACE, p.diff_space),
            (state::PHASE_DIFF_LANE, p.diff_lane),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                self.state.insert(key.into(), Value::String(value));
            }
        }
        let keys = [
            state::PHASE_TOKEN,
            state::PHASE_NAME,
            state::PHASE_REASON,
            state::PHASE_DIFF_FROM,
            state::PHASE_DIFF_TO,
            state::PHASE_DIFF_SPACE,
            state::PHASE_DIFF_LANE,
        ];
        let update: serde_json::Map<String, Value> = keys
            .into_iter()
            .map(|key| {
                (
                    key.to_string(),
                    self.state.get(key).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        Value::Object(update)
    }
}
