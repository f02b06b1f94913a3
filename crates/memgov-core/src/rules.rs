//! Declarative team rules and their enforcement.
//!
//! A rule is plain text parsed deterministically into a [`RuleSpec`]:
//!
//! - the first trust-level word is the required level
//! - action words narrow the rule; no action word governs every action
//! - an event-type word (`decisions`, `facts`, `rules`...) narrows it further
//! - `N approvals` sets a quorum merged into proposal quorum
//!
//! Enforcement order is priority descending, then creation order.

use serde::{Deserialize, Serialize};

use crate::item::{Authority, EventType, ItemMeta, MemoryItem, MemoryKind};
use crate::redaction::sanitize_line;
use crate::store::{MemoryItemFactory, SemanticMemory};
use crate::trust::{TrustAction, TrustLevel};

/// Rules govern the same actions trust does.
pub type RuleAction = TrustAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pending,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    Team,
}

/// Rule fields carried on a rule item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMeta {
    pub scope: RuleScope,
    pub status: RuleStatus,
    pub priority: i64,
    pub created_by: String,
}

/// Parsed form of a rule text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub required_level: Option<TrustLevel>,
    /// Empty means every governed action.
    pub actions: Vec<RuleAction>,
    pub event_type: Option<EventType>,
    pub required_approvals: Option<usize>,
}

impl RuleSpec {
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        let required_level = words.iter().find_map(|w| TrustLevel::from_word(w));

        let mut actions = Vec::new();
        if has(&["propose", "proposes", "proposing"]) {
            actions.push(RuleAction::Propose);
        }
        if has(&["approve", "approves", "approving"]) {
            actions.push(RuleAction::Approve);
        }
        let mentions_rule = has(&["rule", "rules"]);
        let change_rules = mentions_rule && has(&["change", "changes", "changing", "edit"]);
        if has(&["handoff", "handoffs"]) {
            let mut handoff = Vec::new();
            if has(&["create", "creates", "creating"]) {
                handoff.push(RuleAction::HandoffCreate);
            }
            if has(&["apply", "applies", "applying"]) {
                handoff.push(RuleAction::HandoffApply);
            }
            if has(&["reject", "rejects", "rejecting"]) {
                handoff.push(RuleAction::HandoffReject);
            }
            if handoff.is_empty() {
                handoff = vec![
                    RuleAction::HandoffCreate,
                    RuleAction::HandoffApply,
                    RuleAction::HandoffReject,
                ];
            }
            actions.extend(handoff);
        } else if has(&["reject", "rejects", "rejecting"]) {
            actions.push(RuleAction::Reject);
        }
        if change_rules {
            actions.push(RuleAction::ChangeRules);
        }

        let event_type = if has(&["decision", "decisions"]) {
            Some(EventType::Decision)
        } else if has(&["fact", "facts"]) {
            Some(EventType::Fact)
        } else if has(&["preference", "preferences"]) {
            Some(EventType::Preference)
        } else if has(&["correction", "corrections"]) {
            Some(EventType::Correction)
        } else if mentions_rule && !change_rules {
            Some(EventType::Rule)
        } else {
            None
        };

        let required_approvals = words.windows(2).find_map(|pair| {
            matches!(pair[1], "approval" | "approvals")
                .then(|| pair[0].parse::<usize>().ok())
                .flatten()
        });

        Self {
            required_level,
            actions,
            event_type,
            required_approvals,
        }
    }

    pub fn governs(&self, action: RuleAction, event_type: EventType) -> bool {
        let action_matches = self.actions.is_empty() || self.actions.contains(&action);
        let type_matches = self.event_type.map_or(true, |t| t == event_type);
        action_matches && type_matches
    }
}

/// An enforceable rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub text: String,
    pub scope: RuleScope,
    pub priority: i64,
    pub status: RuleStatus,
    /// Creation tick; configured defaults use 0.
    pub created_at: u64,
    pub spec: RuleSpec,
}

impl Rule {
    pub fn new(rule_id: impl Into<String>, text: impl Into<String>, priority: i64) -> Self {
        let text = text.into();
        Self {
            rule_id: rule_id.into(),
            spec: RuleSpec::parse(&text),
            text,
            scope: RuleScope::Team,
            priority,
            status: RuleStatus::Active,
            created_at: 0,
        }
    }

    /// Rebuild a rule from its stored item.
    pub fn from_item(item: &MemoryItem) -> Option<Self> {
        let meta = item.meta.rule.as_ref()?;
        Some(Self {
            rule_id: item.id.clone(),
            text: item.text.clone(),
            scope: meta.scope,
            priority: meta.priority,
            status: meta.status,
            created_at: item.created_at,
            spec: RuleSpec::parse(&item.text),
        })
    }

    pub fn summary_line(&self) -> String {
        sanitize_line(&format!(
            "Rule {} priority {} says {}",
            self.rule_id, self.priority, self.text
        ))
    }
}

/// Stable enforcement order.
pub fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.rule_id.cmp(&b.rule_id))
    });
}

/// Configured defaults plus approved rule items stored under `scope_key`.
pub fn active_rules_for_scope(
    semantic: &SemanticMemory,
    scope_key: &str,
    defaults: &[String],
) -> Vec<Rule> {
    let mut rules: Vec<Rule> = defaults
        .iter()
        .enumerate()
        .map(|(n, text)| Rule::new(format!("default-rule-{}", n + 1), text.clone(), 0))
        .collect();
    rules.extend(
        semantic
            .items_for_store(scope_key)
            .into_iter()
            .filter_map(Rule::from_item)
            .filter(|rule| rule.status == RuleStatus::Active),
    );
    sort_rules(&mut rules);
    rules
}

/// One rule that fired during enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub rule_text: String,
    pub action: RuleAction,
    pub event_type: EventType,
    pub required_level: Option<TrustLevel>,
    pub actor_level: TrustLevel,
    pub allowed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCheckResult {
    pub allowed: bool,
    pub applied: Vec<AppliedRule>,
    pub required_approvals: Option<usize>,
}

impl RuleCheckResult {
    /// Reason of the first denying rule.
    pub fn denial_reason(&self) -> Option<&str> {
        self.applied
            .iter()
            .find(|a| !a.allowed)
            .map(|a| a.reason.as_str())
    }
}

/// Check `action` against every rule that governs it. All governing rules
/// are reported, denials and passes alike.
pub fn enforce_action(
    rules: &[Rule],
    action: RuleAction,
    actor_level: TrustLevel,
    event_type: EventType,
) -> RuleCheckResult {
    let mut applied = Vec::new();
    let mut required_approvals: Option<usize> = None;
    for rule in rules {
        if !rule.spec.governs(action, event_type) {
            continue;
        }
        let allowed = rule
            .spec
            .required_level
            .map_or(true, |level| actor_level >= level);
        let reason = match (rule.spec.required_level, allowed) {
            (Some(level), false) => {
                format!("rule {} requires {level} for {action}", rule.rule_id)
            }
            (Some(level), true) => {
                format!("rule {} allows {actor_level} at or above {level}", rule.rule_id)
            }
            (None, _) => format!("rule {} sets no level for {action}", rule.rule_id),
        };
        if let Some(n) = rule.spec.required_approvals {
            required_approvals = Some(required_approvals.map_or(n, |cur| cur.max(n)));
        }
        applied.push(AppliedRule {
            rule_id: rule.rule_id.clone(),
            rule_text: sanitize_line(&rule.text),
            action,
            event_type,
            required_level: rule.spec.required_level,
            actor_level,
            allowed,
            reason,
        });
    }
    RuleCheckResult {
        allowed: applied.iter().all(|a| a.allowed),
        applied,
        required_approvals,
    }
}

/// Quorum from trust settings merged with a rule-derived quorum.
pub fn merge_required_approvals(base: usize, from_rules: Option<usize>) -> usize {
    from_rules.map_or(base, |n| base.max(n)).max(1)
}

/// Build (but do not store) a rule item.
pub fn build_rule_item(
    factory: &mut MemoryItemFactory,
    store_key: &str,
    text: &str,
    meta: ItemMeta,
    status: RuleStatus,
    priority: i64,
    created_by: &str,
) -> MemoryItem {
    let mut meta = meta.with_event_type(EventType::Rule);
    meta.rule = Some(RuleMeta {
        scope: RuleScope::Team,
        status,
        priority,
        created_by: created_by.to_string(),
    });
    factory.create(store_key, MemoryKind::Semantic, text, Authority::User, meta)
}
