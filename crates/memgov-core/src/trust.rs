//! Trust levels and allow/deny decisions for governed actions.
//!
//! Decisions never fail: callers inspect [`TrustDecision::allowed`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered actor classification, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Viewer,
    Contributor,
    Approver,
    Owner,
}

impl TrustLevel {
    pub const ALL: [TrustLevel; 4] = [
        TrustLevel::Viewer,
        TrustLevel::Contributor,
        TrustLevel::Approver,
        TrustLevel::Owner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Contributor => "contributor",
            Self::Approver => "approver",
            Self::Owner => "owner",
        }
    }

    /// Exact level word, singular or plural.
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.trim().to_ascii_lowercase();
        let word = word.strip_suffix('s').unwrap_or(&word);
        Self::ALL.into_iter().find(|level| level.as_str() == word)
    }

    /// Coarse role fallback.
    pub fn from_role(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "owner" | "admin" => Self::Owner,
            "approver" | "reviewer" | "maintainer" => Self::Approver,
            "contributor" | "editor" | "member" | "developer" => Self::Contributor,
            _ => Self::Viewer,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_word(s).ok_or_else(|| format!("unknown trust level: {s}"))
    }
}

/// Externally supplied identity. Only these three fields are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_trust_level(mut self, level: impl Into<String>) -> Self {
        self.trust_level = Some(level.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Declared level first, then role, then viewer.
    pub fn level(&self) -> TrustLevel {
        trust_level_from_identity(self)
    }

    pub fn actor_id(&self) -> String {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or("anonymous")
            .to_string()
    }
}

pub fn trust_level_from_identity(identity: &Identity) -> TrustLevel {
    if let Some(level) = identity.trust_level.as_deref().and_then(TrustLevel::from_word) {
        return level;
    }
    identity
        .role
        .as_deref()
        .map(TrustLevel::from_role)
        .unwrap_or_default()
}

/// Actions gated by trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAction {
    Propose,
    Approve,
    Reject,
    HandoffCreate,
    HandoffApply,
    HandoffReject,
    ChangeRules,
}

impl TrustAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::HandoffCreate => "handoff_create",
            Self::HandoffApply => "handoff_apply",
            Self::HandoffReject => "handoff_reject",
            Self::ChangeRules => "change_rules",
        }
    }
}

impl fmt::Display for TrustAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Required-level table plus quorum settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustRules {
    pub who_can_propose: TrustLevel,
    pub who_can_approve: TrustLevel,
    pub who_can_reject: TrustLevel,
    pub who_can_handoff_create: TrustLevel,
    pub who_can_handoff_apply: TrustLevel,
    pub who_can_handoff_reject: TrustLevel,
    pub who_can_change_rules: TrustLevel,
    pub required_approvals: usize,
    pub owner_override: bool,
}

impl Default for TrustRules {
    fn default() -> Self {
        Self::standard()
    }
}

impl TrustRules {
    pub fn standard() -> Self {
        Self {
            who_can_propose: TrustLevel::Contributor,
            who_can_approve: TrustLevel::Approver,
            who_can_reject: TrustLevel::Approver,
            who_can_handoff_create: TrustLevel::Contributor,
            who_can_handoff_apply: TrustLevel::Contributor,
            who_can_handoff_reject: TrustLevel::Approver,
            who_can_change_rules: TrustLevel::Owner,
            required_approvals: 2,
            owner_override: true,
        }
    }

    pub fn required_level(&self, action: TrustAction) -> TrustLevel {
        match action {
            TrustAction::Propose => self.who_can_propose,
            TrustAction::Approve => self.who_can_approve,
            TrustAction::Reject => self.who_can_reject,
            TrustAction::HandoffCreate => self.who_can_handoff_create,
            TrustAction::HandoffApply => self.who_can_handoff_apply,
            TrustAction::HandoffReject => self.who_can_handoff_reject,
            TrustAction::ChangeRules => self.who_can_change_rules,
        }
    }

    /// Overlay a state-supplied object onto `self`. Unknown keys and
    /// unparseable values are ignored; `None` when nothing applies.
    pub fn overlay(&self, value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut rules = self.clone();
        let mut touched = false;
        for (key, raw) in map {
            match key.as_str() {
                "required_approvals" | "approval_count_needed" => {
                    if let Some(n) = raw.as_u64() {
                        rules.required_approvals = n.max(1) as usize;
                        touched = true;
                    }
                    continue;
                }
                "owner_override" => {
                    if let Some(flag) = raw.as_bool() {
                        rules.owner_override = flag;
                        touched = true;
                    }
                    continue;
                }
                _ => {}
            }
            let Some(level) = raw.as_str().and_then(TrustLevel::from_word) else {
                continue;
            };
            let slot = match key.as_str() {
                "who_can_propose" => &mut rules.who_can_propose,
                "who_can_approve" => &mut rules.who_can_approve,
                "who_can_reject" => &mut rules.who_can_reject,
                "who_can_handoff_create" => &mut rules.who_can_handoff_create,
                "who_can_handoff_apply" => &mut rules.who_can_handoff_apply,
                "who_can_handoff_reject" => &mut rules.who_can_handoff_reject,
                "who_can_change_rules" => &mut rules.who_can_change_rules,
                _ => continue,
            };
            *slot = level;
            touched = true;
        }
        touched.then_some(rules)
    }
}

/// Outcome of one trust check. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustDecision {
    pub action: TrustAction,
    pub actor_id: String,
    pub actor_level: TrustLevel,
    pub required_level: TrustLevel,
    pub allowed: bool,
    pub reason: String,
}

impl TrustDecision {
    pub fn evaluate(action: TrustAction, actor_level: TrustLevel, rules: &TrustRules) -> Self {
        let required_level = rules.required_level(action);
        let allowed = actor_level >= required_level;
        let reason = if allowed {
            format!("{actor_level} meets {required_level} for {action}")
        } else {
            format!("{action} requires {required_level} but actor is {actor_level}")
        };
        Self {
            action,
            actor_id: "anonymous".to_string(),
            actor_level,
            required_level,
            allowed,
            reason,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }
}

pub fn can_propose(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::Propose, actor_level, rules)
}

pub fn can_approve(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::Approve, actor_level, rules)
}

pub fn can_reject(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::Reject, actor_level, rules)
}

pub fn can_handoff_create(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::HandoffCreate, actor_level, rules)
}

pub fn can_handoff_apply(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::HandoffApply, actor_level, rules)
}

pub fn can_handoff_reject(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::HandoffReject, actor_level, rules)
}

pub fn can_change_rules(actor_level: TrustLevel, rules: &TrustRules) -> TrustDecision {
    TrustDecision::evaluate(TrustAction::ChangeRules, actor_level, rules)
}
