//! Memory item model shared by every store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::agreement::ProposalStatus;
use crate::links::Link;
use crate::rules::RuleMeta;
use crate::scope::{Lane, Space};

/// Which store an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ShortTerm,
    Semantic,
    Profile,
}

impl MemoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::Semantic => "semantic",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer of an item. The same value ranks items when facts conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    System,
    User,
    Tool,
    Ai,
}

impl Authority {
    /// Highest first.
    pub const DEFAULT_ORDER: [Authority; 4] =
        [Authority::System, Authority::User, Authority::Tool, Authority::Ai];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Tool => "tool",
            Self::Ai => "ai",
        }
    }

    /// Rank in `order`, 0 is the strongest. Unlisted sources rank last.
    pub fn rank_in(self, order: &[Authority]) -> usize {
        order
            .iter()
            .position(|a| *a == self)
            .unwrap_or(order.len())
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Authority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "tool" => Ok(Self::Tool),
            "ai" | "assistant" => Ok(Self::Ai),
            other => Err(format!("unknown authority: {other}")),
        }
    }
}

/// Deterministic classification of the text that produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    Context,
    Fact,
    Preference,
    Decision,
    Correction,
    Execution,
    Rule,
    Summary,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Decision => "decision",
            Self::Correction => "correction",
            Self::Execution => "execution",
            Self::Rule => "rule",
            Self::Summary => "summary",
        }
    }
}

/// Provenance of an item copied in by a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffMeta {
    pub packet_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
}

/// Typed item metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub phase_id: String,
    pub space: Space,
    pub lane: Lane,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    /// Profile fact key, e.g. `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub link_preview_text: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summary_of: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_turn_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_target: Option<Space>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement_status: Option<ProposalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handoff_link_previews: Vec<String>,
}

impl ItemMeta {
    pub fn new(phase_id: impl Into<String>, space: Space, lane: Lane, owner: impl Into<String>) -> Self {
        Self {
            phase_id: phase_id.into(),
            space,
            lane,
            owner: owner.into(),
            agent_id: None,
            event_type: EventType::Context,
            dedup_key: None,
            key: None,
            links: Vec::new(),
            link_preview_text: BTreeMap::new(),
            summary_of: Vec::new(),
            source_turn_ids: Vec::new(),
            promoted_from: None,
            promotion_target: None,
            promotion_reason: None,
            impact_warning: None,
            rule: None,
            proposal_id: None,
            agreement_status: None,
            handoff: None,
            handoff_link_previews: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(str::to_string);
        self
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// A single stored memory.
///
/// `id` and `kind` never change after creation; everything else may be
/// rewritten by the owning store (links, promotion metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub store_key: String,
    pub kind: MemoryKind,
    pub text: String,
    pub source: Authority,
    /// Logical tick at creation.
    pub created_at: u64,
    pub meta: ItemMeta,
}

impl MemoryItem {
    pub fn phase_id(&self) -> &str {
        &self.meta.phase_id
    }

    pub fn link_count(&self) -> usize {
        self.meta.links.len()
    }

    pub fn is_summary(&self) -> bool {
        !self.meta.summary_of.is_empty()
    }

    /// Short-term turns that count toward the window capacity.
    pub fn is_conversational(&self) -> bool {
        self.kind == MemoryKind::ShortTerm && !self.is_summary()
    }

    pub fn is_decision(&self) -> bool {
        self.meta.event_type == EventType::Decision
    }

    pub fn has_conflicts(&self) -> bool {
        self.meta
            .links
            .iter()
            .any(|l| l.link_type == crate::links::LinkType::ConflictsWith)
    }

    /// Text used for dedupe comparison: lowercase, collapsed whitespace.
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text)
    }
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
