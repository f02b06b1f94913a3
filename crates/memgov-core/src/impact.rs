//! Bounded traversal of the link graph.
//!
//! Edge direction decides what a change to an item reaches:
//!
//! - `replaced`, `promoted_from`, `supports`: from the carrier to the target
//! - `depends_on`, `caused_by`: from the target back to the carrier
//! - `conflicts_with`: both ways
//!
//! Traversal is breadth-first over links in stored order, visits every item
//! once and stops at `depth_limit` hops or `max_items` items.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::item::MemoryItem;
use crate::links::LinkType;
use crate::redaction::{preview_text, sanitize_line};
use crate::scope::Space;
use crate::store::MemoryStores;

/// Default traversal bounds.
pub const DEFAULT_IMPACT_DEPTH: usize = 2;
pub const DEFAULT_IMPACT_MAX_ITEMS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactDirection {
    /// Reached through a link the parent carries.
    Forward,
    /// Reached through a link the item carries to the parent.
    Backward,
}

/// One reachable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactItem {
    pub memory_id: String,
    pub parent_id: String,
    pub depth: usize,
    pub link_type: LinkType,
    pub direction: ImpactDirection,
    pub phase_id: String,
    pub space: Space,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub title: String,
    pub root_id: String,
    pub depth_limit: usize,
    pub items: Vec<ImpactItem>,
    pub lines: Vec<String>,
    pub path_lines: Vec<String>,
}

fn forward(link_type: LinkType) -> bool {
    matches!(
        link_type,
        LinkType::Replaced | LinkType::PromotedFrom | LinkType::Supports | LinkType::ConflictsWith
    )
}

fn backward(link_type: LinkType) -> bool {
    matches!(
        link_type,
        LinkType::DependsOn | LinkType::CausedBy | LinkType::ConflictsWith
    )
}

/// Neighbours of `id`: its forward links first, then items linking back.
fn neighbours<'a>(
    stores: &'a MemoryStores,
    item: &'a MemoryItem,
) -> Vec<(&'a MemoryItem, LinkType, ImpactDirection)> {
    let mut out = Vec::new();
    for link in item.meta.links.iter().filter(|l| forward(l.link_type)) {
        if let Some(target) = stores.get(&link.to_id) {
            out.push((target, link.link_type, ImpactDirection::Forward));
        }
    }
    for other in stores.all_items() {
        for link in &other.meta.links {
            if link.to_id == item.id && backward(link.link_type) {
                out.push((other, link.link_type, ImpactDirection::Backward));
            }
        }
    }
    out
}

/// Items reachable from `memory_id`. An unknown id yields an empty result.
pub fn compute_impact(
    stores: &MemoryStores,
    memory_id: &str,
    depth_limit: usize,
    max_items: usize,
) -> ImpactResult {
    let items = match stores.get(memory_id) {
        Some(root) => walk(stores, root, depth_limit, max_items),
        None => Vec::new(),
    };
    build_result(memory_id, depth_limit, items)
}

/// Impact of an item that may already be gone from the stores, such as a
/// conflict loser. Only items that still link back to it are reachable.
pub fn impact_of_item(
    stores: &MemoryStores,
    root: &MemoryItem,
    depth_limit: usize,
    max_items: usize,
) -> ImpactResult {
    build_result(&root.id, depth_limit, walk(stores, root, depth_limit, max_items))
}

fn walk(
    stores: &MemoryStores,
    root: &MemoryItem,
    depth_limit: usize,
    max_items: usize,
) -> Vec<ImpactItem> {
    let mut items: Vec<ImpactItem> = Vec::new();
    let mut visited = BTreeSet::from([root.id.clone()]);
    let mut queue = VecDeque::from([(root, 0usize)]);
    'walk: while let Some((current, depth)) = queue.pop_front() {
        if depth >= depth_limit {
            continue;
        }
        for (next, link_type, direction) in neighbours(stores, current) {
            if items.len() >= max_items {
                break 'walk;
            }
            if !visited.insert(next.id.clone()) {
                continue;
            }
            items.push(ImpactItem {
                memory_id: next.id.clone(),
                parent_id: current.id.clone(),
                depth: depth + 1,
                link_type,
                direction,
                phase_id: next.meta.phase_id.clone(),
                space: next.meta.space,
                preview: preview_text(&next.text),
            });
            queue.push_back((next, depth + 1));
        }
    }
    items
}

fn build_result(memory_id: &str, depth_limit: usize, items: Vec<ImpactItem>) -> ImpactResult {
    let title = sanitize_line(&format!("Impact of {memory_id}"));
    let mut lines = vec![sanitize_line(&format!(
        "Changing {memory_id} reaches {} items.",
        items.len()
    ))];
    lines.extend(items.iter().map(|item| {
        sanitize_line(&format!(
            "{} at depth {} through {} in {} {}. Preview is {}.",
            item.memory_id,
            item.depth,
            item.link_type,
            item.space,
            item.phase_id,
            item.preview
        ))
    }));
    let path_lines = items
        .iter()
        .map(|item| sanitize_line(&format!("Path {}.", path_to(&items, memory_id, item).join(" then "))))
        .collect();

    ImpactResult {
        title,
        root_id: memory_id.to_string(),
        depth_limit,
        items,
        lines,
        path_lines,
    }
}

fn path_to<'a>(items: &'a [ImpactItem], root_id: &'a str, item: &'a ImpactItem) -> Vec<&'a str> {
    let mut path = vec![item.memory_id.as_str()];
    let mut parent = item.parent_id.as_str();
    while parent != root_id {
        match items.iter().find(|i| i.memory_id == parent) {
            Some(step) => {
                path.push(step.memory_id.as_str());
                parent = step.parent_id.as_str();
            }
            None => break,
        }
    }
    path.push(root_id);
    path.reverse();
    path
}

/// Full report: title, depth used, item lines and path lines.
pub fn render_impact(result: &ImpactResult, depth_used: usize) -> Vec<String> {
    let mut out = vec![
        result.title.clone(),
        format!("Depth used is {depth_used}."),
    ];
    out.extend(result.lines.iter().cloned());
    out.extend(result.path_lines.iter().cloned());
    out
}

/// Short "what if" preview for a pending change of `change_kind`
/// (`replace`, `delete`, `promote`; anything else reads as a change).
pub fn render_change_preview(result: &ImpactResult, change_kind: &str) -> Vec<String> {
    let verb = match change_kind {
        "replace" => "replaced",
        "delete" => "deleted",
        "promote" => "promoted",
        _ => "changed",
    };
    let mut out = vec![sanitize_line(&format!(
        "If {} is {verb}, {} items may change.",
        result.root_id,
        result.items.len()
    ))];
    out.extend(
        result
            .items
            .iter()
            .map(|item| sanitize_line(&format!("Check {} with preview {}.", item.memory_id, item.preview))),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Authority, ItemMeta, MemoryKind};
    use crate::links::Link;
    use crate::redaction::is_bracket_free;
    use crate::scope::Lane;
    use crate::store::MemoryItemFactory;

    const KEY: &str = "session:anon";

    fn create(factory: &mut MemoryItemFactory, text: &str, links: Vec<Link>) -> MemoryItem {
        let mut meta = ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon");
        meta.links = links;
        factory.create(KEY, MemoryKind::Semantic, text, Authority::User, meta)
    }

    fn link(link_type: LinkType, to: &str) -> Link {
        Link::new(link_type, to, link_type.as_str(), "phase-1")
    }

    fn store(stores: &mut MemoryStores, items: &[&MemoryItem]) {
        for item in items {
            stores.semantic.store_item((*item).clone(), false, &Authority::DEFAULT_ORDER);
        }
    }

    fn ids(result: &ImpactResult) -> Vec<&str> {
        result.items.iter().map(|i| i.memory_id.as_str()).collect()
    }

    // ------------------------------------------------------------------
    // Direction
    // ------------------------------------------------------------------

    #[test]
    fn test_depends_on_points_backward() {
        let mut factory = MemoryItemFactory::new();
        let mut stores = MemoryStores::new();
        let target = create(&mut factory, "Target", vec![]);
        let source = create(&mut factory, "Source", vec![link(LinkType::DependsOn, &target.id)]);
        store(&mut stores, &[&target, &source]);

        assert_eq!(ids(&compute_impact(&stores, &target.id, 2, 10)), vec![source.id.as_str()]);
        assert!(compute_impact(&stores, &source.id, 2, 10).items.is_empty());
    }

    #[test]
    fn test_replaced_points_forward() {
        let mut factory = MemoryItemFactory::new();
        let mut stores = MemoryStores::new();
        let old = create(&mut factory, "Old", vec![]);
        let new = create(&mut factory, "New", vec![link(LinkType::Replaced, &old.id)]);
        store(&mut stores, &[&old, &new]);

        assert_eq!(ids(&compute_impact(&stores, &new.id, 2, 10)), vec![old.id.as_str()]);
        assert!(compute_impact(&stores, &old.id, 2, 10).items.is_empty());
    }

    #[test]
    fn test_conflicts_with_goes_both_ways() {
        let mut factory = MemoryItemFactory::new();
        let mut stores = MemoryStores::new();
        let second_id = "session:anon:semantic:2";
        let first = create(&mut factory, "First", vec![link(LinkType::ConflictsWith, second_id)]);
        let second = create(&mut factory, "Second", vec![]);
        store(&mut stores, &[&first, &second]);

        assert_eq!(ids(&compute_impact(&stores, &first.id, 2, 10)), vec![second_id]);
        assert_eq!(ids(&compute_impact(&stores, second_id, 2, 10)), vec![first.id.as_str()]);
    }

    // ------------------------------------------------------------------
    // Bounds and rendering
    // ------------------------------------------------------------------

    #[test]
    fn test_bounds_and_discovery_order() {
        let mut factory = MemoryItemFactory::new();
        let mut stores = MemoryStores::new();
        let c = create(&mut factory, "C", vec![]);
        let b = create(&mut factory, "B", vec![link(LinkType::Supports, &c.id)]);
        let a = create(&mut factory, "A", vec![]);
        let root = create(
            &mut factory,
            "Root",
            vec![link(LinkType::Replaced, &b.id), link(LinkType::PromotedFrom, &a.id)],
        );
        store(&mut stores, &[&c, &b, &a, &root]);

        let full = compute_impact(&stores, &root.id, 2, 10);
        assert_eq!(ids(&full), vec![b.id.as_str(), a.id.as_str(), c.id.as_str()]);
        assert_eq!(
            full.path_lines[2],
            format!("Path {} then {} then {}.", root.id, b.id, c.id)
        );
        assert_eq!(compute_impact(&stores, &root.id, 1, 10).items.len(), 2);
        assert_eq!(compute_impact(&stores, &root.id, 2, 1).items.len(), 1);
    }

    #[test]
    fn test_cycles_visit_once_and_render_bracket_free() {
        let mut factory = MemoryItemFactory::new();
        let mut stores = MemoryStores::new();
        let second_id = "session:anon:semantic:2";
        let first = create(&mut factory, "First [demo]", vec![link(LinkType::PromotedFrom, second_id)]);
        let second = create(&mut factory, "Second {demo}", vec![link(LinkType::PromotedFrom, &first.id)]);
        store(&mut stores, &[&first, &second]);

        let result = compute_impact(&stores, &first.id, 2, 10);
        assert_eq!(result.items.len(), 1);

        let mut all = render_impact(&result, 2);
        all.extend(render_change_preview(&result, "replace"));
        assert!(all.iter().all(|line| is_bracket_free(line)));
        assert!(all.iter().any(|line| line.contains("is replaced")));
    }

    #[test]
    fn test_unknown_root_is_empty() {
        let stores = MemoryStores::new();
        let result = compute_impact(&stores, "missing", 2, 10);
        assert!(result.items.is_empty());
        assert_eq!(result.lines, vec!["Changing missing reaches 0 items."]);
    }
}
