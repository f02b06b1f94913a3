//! Reserved keys of the interpreter state channel.
//!
//! Callers signal administrative intent by setting these keys on the state
//! object handed to the next recall or record call. Everything else in the
//! state is ignored.

use serde_json::{Map, Value};

use crate::agreement::{AgreementAction, AgreementRequest};
use crate::phase::PhaseRequest;
use crate::scope::{Lane, Space};

/// Interpreter state as a JSON object.
pub type StateMap = Map<String, Value>;

pub const SESSION_ID: &str = "session_id";

pub const PHASE_TOKEN: &str = "_memory_phase_token";
pub const PHASE_NAME: &str = "_memory_phase_name";
pub const PHASE_REASON: &str = "_memory_phase_reason";
pub const PHASE_DIFF_FROM: &str = "_memory_phase_diff_from";
pub const PHASE_DIFF_TO: &str = "_memory_phase_diff_to";
pub const PHASE_DIFF_SPACE: &str = "_memory_phase_diff_space";
pub const PHASE_DIFF_LANE: &str = "_memory_phase_diff_lane";

pub const TRUST_RULES: &str = "_memory_trust_rules";

pub const IMPACT_ID: &str = "_memory_impact_id";
pub const IMPACT_DEPTH: &str = "_memory_impact_depth";
pub const IMPACT_MAX_ITEMS: &str = "_memory_impact_max_items";
pub const CHANGE_KIND: &str = "_memory_change_kind";

pub const AGREEMENT_ACTION: &str = "_memory_agreement_action";
pub const AGREEMENT_ID: &str = "_memory_agreement_id";
pub const AGREEMENT_REQUESTED_BY: &str = "_memory_agreement_requested_by";

/// Non-empty string value; numbers are rendered as text.
fn text(state: &StateMap, key: &str) -> Option<String> {
    match state.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count(state: &StateMap, key: &str) -> Option<usize> {
    match state.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn session_id(state: &StateMap) -> Option<String> {
    text(state, SESSION_ID)
}

pub fn phase_request(state: &StateMap) -> Option<PhaseRequest> {
    let token = text(state, PHASE_TOKEN)?;
    Some(PhaseRequest {
        token,
        name: text(state, PHASE_NAME),
        reason: text(state, PHASE_REASON),
    })
}

/// Phase diff requested through the state channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRequest {
    pub from_phase_id: String,
    pub to_phase_id: String,
    pub space: Option<Space>,
    pub lane: Option<Lane>,
}

pub fn diff_request(state: &StateMap) -> Option<DiffRequest> {
    Some(DiffRequest {
        from_phase_id: text(state, PHASE_DIFF_FROM)?,
        to_phase_id: text(state, PHASE_DIFF_TO)?,
        space: text(state, PHASE_DIFF_SPACE).and_then(|s| s.parse().ok()),
        lane: text(state, PHASE_DIFF_LANE).and_then(|s| s.parse().ok()),
    })
}

pub fn trust_rules_override(state: &StateMap) -> Option<&Value> {
    state.get(TRUST_RULES).filter(|v| v.is_object())
}

/// Impact report requested through the state channel. Missing bounds fall
/// back to configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactRequest {
    pub memory_id: String,
    pub depth_limit: Option<usize>,
    pub max_items: Option<usize>,
    pub change_kind: Option<String>,
}

pub fn impact_request(state: &StateMap) -> Option<ImpactRequest> {
    Some(ImpactRequest {
        memory_id: text(state, IMPACT_ID)?,
        depth_limit: count(state, IMPACT_DEPTH),
        max_items: count(state, IMPACT_MAX_ITEMS),
        change_kind: text(state, CHANGE_KIND),
    })
}

/// Unknown action words are ignored rather than reported.
pub fn agreement_request(state: &StateMap) -> Option<AgreementRequest> {
    let action: AgreementAction = text(state, AGREEMENT_ACTION)?.parse().ok()?;
    Some(AgreementRequest {
        action,
        proposal_id: text(state, AGREEMENT_ID),
        requested_by: text(state, AGREEMENT_REQUESTED_BY),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> StateMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_session_id_accepts_numbers_and_ignores_blank() {
        assert_eq!(session_id(&state(json!({"session_id": 42}))).as_deref(), Some("42"));
        assert_eq!(session_id(&state(json!({"session_id": "  "}))), None);
        assert_eq!(session_id(&StateMap::new()), None);
    }

    #[test]
    fn test_phase_and_diff_requests() {
        let s = state(json!({
            "_memory_phase_token": "sprint-2",
            "_memory_phase_reason": "planning",
            "_memory_phase_diff_from": "phase-1",
            "_memory_phase_diff_to": "phase-2",
            "_memory_phase_diff_lane": "team",
        }));
        let phase = phase_request(&s).unwrap();
        assert_eq!(phase.token, "sprint-2");
        assert_eq!(phase.reason.as_deref(), Some("planning"));
        let diff = diff_request(&s).unwrap();
        assert_eq!(diff.lane, Some(Lane::Team));
        assert_eq!(diff.space, None);
    }

    #[test]
    fn test_diff_needs_both_ends() {
        let s = state(json!({"_memory_phase_diff_from": "phase-1"}));
        assert!(diff_request(&s).is_none());
    }

    #[test]
    fn test_impact_and_agreement_requests() {
        let s = state(json!({
            "_memory_impact_id": "session:anon:semantic:1",
            "_memory_impact_depth": "3",
            "_memory_agreement_action": "approve",
            "_memory_agreement_requested_by": "bob",
        }));
        let impact = impact_request(&s).unwrap();
        assert_eq!(impact.depth_limit, Some(3));
        assert_eq!(impact.max_items, None);
        let agreement = agreement_request(&s).unwrap();
        assert_eq!(agreement.action, AgreementAction::Approve);
        assert_eq!(agreement.requested_by.as_deref(), Some("bob"));

        let bad = state(json!({"_memory_agreement_action": "veto"}));
        assert!(agreement_request(&bad).is_none());
    }
}
