//! Scenario files: a profile, an identity, an initial state and a list of
//! steps replayed against a fresh manager.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ScenarioError, ScenarioResult};
use crate::config::AgentProfile;
use crate::error::Result;
use crate::manager::ToolEvent;
use crate::scope::Space;
use crate::state::StateMap;
use crate::trust::Identity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_profile")]
    pub ai_profile: AgentProfile,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub initial_state: StateMap,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

fn default_profile() -> AgentProfile {
    AgentProfile::new("assistant")
}

impl Scenario {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        let scenario_id = scenario_id.into();
        Self {
            name: scenario_id.clone(),
            scenario_id,
            ai_profile: default_profile(),
            identity: Identity::anonymous(),
            initial_state: StateMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.ai_profile = profile;
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_state(mut self, state: StateMap) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The id names the artifact directory, so it must be one path segment.
    pub fn validate(&self) -> ScenarioResult<()> {
        let id = self.scenario_id.trim();
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(ScenarioError::InvalidId(self.scenario_id.clone()));
        }
        Ok(())
    }
}

/// One step. `kind` stays a string so an unknown kind is reported with its
/// step index instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    /// Identity for this step only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl ScenarioStep {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            identity: None,
        }
    }

    pub fn recall(agent_id: Option<&str>) -> Self {
        Self::new(
            "recall",
            serde_json::json!({ "input": "", "agent_id": agent_id }),
        )
    }

    pub fn record(input: &str, output: &str) -> Self {
        Self::new(
            "record",
            serde_json::json!({ "input": input, "output": output }),
        )
    }

    pub fn admin(action: &str, payload: Value) -> Self {
        Self::new(
            "admin",
            serde_json::json!({ "action": action, "payload": payload }),
        )
    }

    pub fn as_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Recall,
    Record,
    Admin,
}

impl StepKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim() {
            "recall" => Some(Self::Recall),
            "record" => Some(Self::Record),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    ProposeRule,
    ApplyAgreement,
    CreateHandoff,
    ApplyHandoff,
    RejectHandoff,
    ComputeImpact,
    AdvancePhase,
}

impl AdminAction {
    pub const ALL: [AdminAction; 7] = [
        AdminAction::ProposeRule,
        AdminAction::ApplyAgreement,
        AdminAction::CreateHandoff,
        AdminAction::ApplyHandoff,
        AdminAction::RejectHandoff,
        AdminAction::ComputeImpact,
        AdminAction::AdvancePhase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProposeRule => "propose_rule",
            Self::ApplyAgreement => "apply_agreement",
            Self::CreateHandoff => "create_handoff",
            Self::ApplyHandoff => "apply_handoff",
            Self::RejectHandoff => "reject_handoff",
            Self::ComputeImpact => "compute_impact",
            Self::AdvancePhase => "advance_phase",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        let action = action.trim();
        Self::ALL.into_iter().find(|a| a.as_str() == action)
    }
}

// ----------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RecallPayload {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RecordPayload {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub tool_events: Vec<ToolEvent>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AdminPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProposeRulePayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AgreementPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub proposal_id: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CreateHandoffPayload {
    #[serde(default)]
    pub from_agent_id: Option<String>,
    #[serde(default)]
    pub to_agent_id: Option<String>,
    #[serde(default)]
    pub space: Option<Space>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PacketPayload {
    #[serde(default)]
    pub packet_id: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ImpactPayload {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub depth_limit: Option<usize>,
    #[serde(default)]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PhasePayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub diff_from: Option<String>,
    #[serde(default)]
    pub diff_to: Option<String>,
    #[serde(default)]
    pub diff_space: Option<String>,
    #[serde(default)]
    pub diff_lane: Option<String>,
}

/// Decode a step payload; `null` reads as an empty object.
pub(crate) fn decode<T: DeserializeOwned + Default>(
    step_index: usize,
    value: &Value,
) -> ScenarioResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| ScenarioError::InvalidPayload {
        step_index,
        reason: e.to_string(),
    })
}

/// Present and non-blank.
pub(crate) fn given(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_scenario() {
        let scenario = Scenario::from_json_str(
            r#"{"scenario_id": "basic", "steps": [{"kind": "recall"}]}"#,
        )
        .unwrap();
        assert_eq!(scenario.ai_profile.name, "assistant");
        assert_eq!(scenario.steps.len(), 1);
        assert!(scenario.steps[0].payload.is_null());
    }

    #[test]
    fn test_scenario_id_must_be_a_segment() {
        for id in ["", "  ", "a/b", "..", "a\\b"] {
            assert!(Scenario::new(id).validate().is_err(), "{id:?}");
        }
        assert!(Scenario::new("approvers-only").validate().is_ok());
    }

    #[test]
    fn test_admin_action_names() {
        for action in AdminAction::ALL {
            assert_eq!(AdminAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AdminAction::parse("drop_tables"), None);
        assert_eq!(StepKind::parse(" record "), Some(StepKind::Record));
        assert_eq!(StepKind::parse("replay"), None);
    }

    #[test]
    fn test_decode_reports_step_index() {
        let err = decode::<RecordPayload>(3, &json!({"tool_events": "nope"})).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidPayload { step_index: 3, .. }));
        let empty: RecordPayload = decode(1, &Value::Null).unwrap();
        assert!(empty.tool_events.is_empty());
    }

    #[test]
    fn test_given_drops_blank() {
        assert_eq!(given(Some("  ".into())), None);
        assert_eq!(given(Some("p".into())), Some("p".to_string()));
    }
}
