//! Bounded provenance links between memory items.
//!
//! Links are id-only references owned by the item that carries them. An item
//! keeps at most `max_links` links; adding one more evicts the oldest, and its
//! preview entry goes with it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::MemoryItem;
use crate::redaction::{preview_text, sanitize_line};
use crate::store::MemoryStores;

/// Default per-item link bound.
pub const MAX_LINKS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Replaced,
    ConflictsWith,
    PromotedFrom,
    CausedBy,
    DependsOn,
    Supports,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replaced => "replaced",
            Self::ConflictsWith => "conflicts_with",
            Self::PromotedFrom => "promoted_from",
            Self::CausedBy => "caused_by",
            Self::DependsOn => "depends_on",
            Self::Supports => "supports",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Replaced => "Replaced",
            Self::ConflictsWith => "Conflicts with",
            Self::PromotedFrom => "Promoted from",
            Self::CausedBy => "Caused by",
            Self::DependsOn => "Depends on",
            Self::Supports => "Supports",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference from the carrying item to `to_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub link_type: LinkType,
    pub to_id: String,
    pub reason_code: String,
    pub created_in_phase_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
}

impl Link {
    pub fn new(
        link_type: LinkType,
        to_id: impl Into<String>,
        reason_code: impl Into<String>,
        created_in_phase_id: impl Into<String>,
    ) -> Self {
        Self {
            link_type,
            to_id: to_id.into(),
            reason_code: reason_code.into(),
            created_in_phase_id: created_in_phase_id.into(),
            source_event_id: None,
        }
    }

    pub fn with_source_event(mut self, event_id: impl Into<String>) -> Self {
        self.source_event_id = Some(event_id.into());
        self
    }
}

/// Append `link` to `item`, evicting the oldest links beyond `max_links`.
///
/// A link with the same type and target replaces the earlier one. The
/// preview is redacted before storage; previews of evicted targets are
/// dropped in the same step.
pub fn add_link_to_item(
    mut item: MemoryItem,
    link: Link,
    preview: Option<&str>,
    max_links: usize,
) -> MemoryItem {
    let meta = &mut item.meta;
    meta.links
        .retain(|l| !(l.link_type == link.link_type && l.to_id == link.to_id));
    let target = link.to_id.clone();
    meta.links.push(link);

    let overflow = meta.links.len().saturating_sub(max_links);
    if overflow > 0 {
        meta.links.drain(..overflow);
    }

    if let Some(raw) = preview {
        meta.link_preview_text.insert(target, preview_text(raw));
    }
    let live: BTreeSet<&str> = meta.links.iter().map(|l| l.to_id.as_str()).collect();
    meta.link_preview_text
        .retain(|to_id, _| live.contains(to_id.as_str()));
    item
}

/// One line per link, in stored order.
pub fn link_lines(item: &MemoryItem) -> Vec<String> {
    item.meta
        .links
        .iter()
        .map(|link| {
            let mut line = format!(
                "{} {} because {} in {}.",
                link.link_type.label(),
                link.to_id,
                link.reason_code,
                link.created_in_phase_id
            );
            if let Some(preview) = item.meta.link_preview_text.get(&link.to_id) {
                line.push_str(&format!(" Preview is {preview}."));
            }
            sanitize_line(&line)
        })
        .collect()
}

/// Provenance summary grouped by link type, in first-seen order.
pub fn path_lines(item: &MemoryItem) -> Vec<String> {
    if item.meta.links.is_empty() {
        return vec![sanitize_line(&format!("Memory {} has no links.", item.id))];
    }
    let mut groups: Vec<(LinkType, Vec<&str>)> = Vec::new();
    for link in &item.meta.links {
        match groups.iter_mut().find(|(t, _)| *t == link.link_type) {
            Some((_, ids)) => ids.push(&link.to_id),
            None => groups.push((link.link_type, vec![&link.to_id])),
        }
    }
    let mut lines = vec![sanitize_line(&format!(
        "Memory {} has {} links.",
        item.id,
        item.meta.links.len()
    ))];
    for (link_type, ids) in groups {
        lines.push(sanitize_line(&format!(
            "{} {}.",
            link_type.label(),
            ids.join(" and ")
        )));
    }
    lines
}

/// Applies links to items held in the stores and remembers which items
/// changed so link events can be emitted once per turn.
#[derive(Debug, Default)]
pub struct LinkTracker {
    max_links: usize,
    updated: BTreeSet<String>,
}

impl LinkTracker {
    pub fn new(max_links: usize) -> Self {
        Self {
            max_links,
            updated: BTreeSet::new(),
        }
    }

    /// Returns false when `from_id` is not in any store.
    pub fn add_link(
        &mut self,
        stores: &mut MemoryStores,
        from_id: &str,
        link: Link,
        preview: Option<&str>,
    ) -> bool {
        let max_links = self.max_links;
        let changed = stores.update_item(from_id, |item| {
            add_link_to_item(item, link, preview, max_links)
        });
        if changed {
            self.updated.insert(from_id.to_string());
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
    }

    /// Current state of every touched item still stored, sorted by id.
    pub fn updated_items(&self, stores: &MemoryStores) -> BTreeMap<String, MemoryItem> {
        self.updated
            .iter()
            .filter_map(|id| stores.get(id).map(|item| (id.clone(), item.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Authority, ItemMeta, MemoryKind};
    use crate::redaction::{is_bracket_free, REDACTION_MARKER};
    use crate::scope::{Lane, Space};

    fn base_item() -> MemoryItem {
        MemoryItem {
            id: "session:anon:semantic:1".into(),
            store_key: "session:anon".into(),
            kind: MemoryKind::Semantic,
            text: "root".into(),
            source: Authority::User,
            created_at: 1,
            meta: ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon"),
        }
    }

    #[test]
    fn test_twelve_links_keep_ten_most_recent() {
        let mut item = base_item();
        for n in 1..=12 {
            let link = Link::new(LinkType::Supports, format!("t-{n}"), "test", "phase-1");
            item = add_link_to_item(item, link, Some(&format!("target {n}")), MAX_LINKS);
        }
        let ids: Vec<&str> = item.meta.links.iter().map(|l| l.to_id.as_str()).collect();
        let expected: Vec<String> = (3..=12).map(|n| format!("t-{n}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(item.meta.link_preview_text.len(), 10);
        assert!(!item.meta.link_preview_text.contains_key("t-1"));
        assert!(!item.meta.link_preview_text.contains_key("t-2"));
    }

    #[test]
    fn test_duplicate_link_moves_to_end() {
        let mut item = base_item();
        item = add_link_to_item(item, Link::new(LinkType::Replaced, "a", "r", "p"), None, MAX_LINKS);
        item = add_link_to_item(item, Link::new(LinkType::Replaced, "b", "r", "p"), None, MAX_LINKS);
        item = add_link_to_item(item, Link::new(LinkType::Replaced, "a", "r", "p"), None, MAX_LINKS);
        let ids: Vec<&str> = item.meta.links.iter().map(|l| l.to_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_preview_is_redacted_on_insert() {
        let item = add_link_to_item(
            base_item(),
            Link::new(LinkType::Replaced, "x", "replaced", "phase-1"),
            Some("old password: hunter2 (draft)"),
            MAX_LINKS,
        );
        let preview = &item.meta.link_preview_text["x"];
        assert!(preview.contains(REDACTION_MARKER));
        assert!(!preview.contains("hunter2"));
        assert!(is_bracket_free(preview));
    }

    #[test]
    fn test_link_and_path_lines_are_bracket_free() {
        let mut item = base_item();
        item = add_link_to_item(
            item,
            Link::new(LinkType::CausedBy, "call(1)", "tool_call", "phase-1"),
            Some("tool search"),
            MAX_LINKS,
        );
        item = add_link_to_item(
            item,
            Link::new(LinkType::CausedBy, "call-2", "tool_call", "phase-1"),
            None,
            MAX_LINKS,
        );
        let lines = link_lines(&item);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Preview is tool search"));
        let path = path_lines(&item);
        assert_eq!(path[0], "Memory session:anon:semantic:1 has 2 links.");
        assert_eq!(path[1], "Caused by call1 and call-2.");
        assert!(lines.iter().chain(path.iter()).all(|l| is_bracket_free(l)));
    }
}
