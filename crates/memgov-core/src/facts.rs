//! Deterministic reading of user text: event classification, profile fact
//! extraction and promotion requests. Pattern matching only; nothing here
//! consults a model.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::item::EventType;
use crate::scope::{Lane, Space};

const CORRECTION_PREFIXES: [&str; 3] = ["actually", "correction", "no,"];
const DECISION_MARKERS: [&str; 4] = ["we decided", "decision:", "let's go with", "we will use"];
const PREFERENCE_MARKERS: [&str; 3] = ["i prefer", "i like", "i don't like"];

/// Classify one turn. Corrections outrank everything, tool-only turns are
/// executions.
pub fn classify_event_type(text: &str, has_tool_events: bool) -> EventType {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return if has_tool_events {
            EventType::Execution
        } else {
            EventType::Context
        };
    }
    if CORRECTION_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.contains("correction:") {
        return EventType::Correction;
    }
    if DECISION_MARKERS.iter().any(|m| lower.contains(m)) {
        return EventType::Decision;
    }
    if PREFERENCE_MARKERS.iter().any(|m| lower.contains(m)) {
        return EventType::Preference;
    }
    if extract_fact(text).is_some() {
        return EventType::Fact;
    }
    EventType::Context
}

/// A profile attribute read from user text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: String,
}

impl Fact {
    /// Dedup key shared by every statement of the same attribute.
    pub fn dedup_key(&self) -> String {
        format!("fact:{}", self.key)
    }
}

struct FactPatterns {
    name: Option<Regex>,
    call_me: Option<Regex>,
    prefer: Option<Regex>,
    my_attr: Option<Regex>,
}

fn patterns() -> &'static FactPatterns {
    static PATTERNS: OnceLock<FactPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FactPatterns {
        name: Regex::new(r"(?i)\bmy name is\s+([^.,!?]+)").ok(),
        call_me: Regex::new(r"(?i)\bcall me\s+([^.,!?]+)").ok(),
        prefer: Regex::new(r"(?i)\bi prefer\s+([^.!?]+)").ok(),
        my_attr: Regex::new(r"(?i)\bmy\s+([a-z][a-z ]{0,30}?)\s+is\s+([^.,!?]+)").ok(),
    })
}

fn clean_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_end_matches(['.', '!', '?']).trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// First matching fact pattern: `my name is X`, `call me X`, `I prefer X`,
/// then `my X is Y`.
pub fn extract_fact(text: &str) -> Option<Fact> {
    let p = patterns();
    let find = |re: &'static Option<Regex>| re.as_ref().and_then(|re| re.captures(text));
    if let Some(caps) = find(&p.name).or_else(|| find(&p.call_me)) {
        return Some(Fact {
            key: "name".to_string(),
            value: clean_value(&caps[1])?,
        });
    }
    if let Some(caps) = find(&p.prefer) {
        return Some(Fact {
            key: "preference".to_string(),
            value: clean_value(&caps[1])?,
        });
    }
    let caps = find(&p.my_attr)?;
    let key = caps[1].trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_");
    Some(Fact {
        key,
        value: clean_value(&caps[2])?,
    })
}

/// Whether a user turn of this type is durable enough for semantic memory.
pub fn should_write_semantic(event_type: EventType, promotion: Option<&PromotionRequest>) -> bool {
    promotion.is_some()
        || matches!(
            event_type,
            EventType::Fact | EventType::Preference | EventType::Decision | EventType::Correction
        )
}

/// Where a user asked an item to be remembered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub target_space: Space,
    pub target_lane: Lane,
    pub reason: String,
}

impl PromotionRequest {
    /// Team-lane promotions go through a proposal.
    pub fn needs_agreement(&self) -> bool {
        self.target_lane == Lane::Team
    }
}

const PROMOTION_VERBS: [&str; 4] = ["remember", "keep", "save", "note"];

/// Promotion phrase in `text`, if any. A verb such as `remember` must be
/// present so that ordinary requests ("book it for me") do not promote.
pub fn infer_promotion_request(text: &str) -> Option<PromotionRequest> {
    let lower = text.to_lowercase();
    if !PROMOTION_VERBS.iter().any(|v| lower.contains(v)) {
        return None;
    }
    let (target_space, target_lane, reason) = if lower.contains("for the team") {
        (Space::Project, Lane::Team, "team_request")
    } else if lower.contains("for the project") {
        (Space::Project, Lane::Team, "project_request")
    } else if lower.contains("across sessions") {
        (Space::User, Lane::Agent, "cross_session_request")
    } else if lower.contains("for me") {
        (Space::User, Lane::Agent, "user_request")
    } else {
        return None;
    };
    Some(PromotionRequest {
        target_space,
        target_lane,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------
    // Classification
    // ------------------------------------------------------------------

    #[test]
    fn test_correction_outranks_fact() {
        assert_eq!(
            classify_event_type("Actually, my name is Grace", false),
            EventType::Correction
        );
        assert_eq!(classify_event_type("My name is Grace", false), EventType::Fact);
    }

    #[test]
    fn test_decision_preference_and_context() {
        assert_eq!(classify_event_type("We decided to ship Friday", false), EventType::Decision);
        assert_eq!(classify_event_type("I prefer dark mode", false), EventType::Preference);
        assert_eq!(classify_event_type("hello there", false), EventType::Context);
        assert_eq!(classify_event_type("", true), EventType::Execution);
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    #[test]
    fn test_extract_name_forms() {
        let fact = extract_fact("Hi, my name is Ada Lovelace.").unwrap();
        assert_eq!(fact, Fact { key: "name".into(), value: "Ada Lovelace".into() });
        assert_eq!(extract_fact("please call me Ada").unwrap().value, "Ada");
        assert_eq!(fact.dedup_key(), "fact:name");
    }

    #[test]
    fn test_extract_attribute_and_preference() {
        let fact = extract_fact("my favorite color is teal").unwrap();
        assert_eq!(fact.key, "favorite_color");
        assert_eq!(fact.value, "teal");
        assert_eq!(extract_fact("I prefer tabs").unwrap().key, "preference");
        assert!(extract_fact("the weather is nice").is_none());
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    #[test]
    fn test_promotion_targets() {
        let team = infer_promotion_request("Remember this for the team: deploys on Friday").unwrap();
        assert_eq!(team.target_lane, Lane::Team);
        assert!(team.needs_agreement());

        let user = infer_promotion_request("remember this for me").unwrap();
        assert_eq!(user.target_space, Space::User);
        assert!(!user.needs_agreement());

        assert!(infer_promotion_request("book a table for me").is_none());
    }
}
