//! Copying a packet's frozen snapshots into the receiving agent's lane.

use super::packet::HandoffPacket;
use crate::item::{HandoffMeta, MemoryItem};
use crate::links::LinkTracker;
use crate::phase::{Phase, PhaseLedger};
use crate::redaction::preview_text;
use crate::scope::{Lane, Space};
use crate::store::{commit_item, CommitPolicy, Deletion, MemoryItemFactory, MemoryStores};

/// Where applied items land.
#[derive(Debug, Clone, Copy)]
pub struct HandoffTarget<'a> {
    pub store_key: &'a str,
    pub phase: &'a Phase,
    pub space: Space,
    pub owner: &'a str,
    pub agent_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffApplyOutcome {
    /// Newly written copies in packet order.
    pub applied: Vec<MemoryItem>,
    pub deleted: Vec<Deletion>,
}

fn handoff_copy(
    factory: &mut MemoryItemFactory,
    packet: &HandoffPacket,
    snapshot: &MemoryItem,
    target: &HandoffTarget<'_>,
) -> MemoryItem {
    let mut meta = snapshot.meta.clone();
    meta.handoff_link_previews = meta
        .links
        .iter()
        .filter_map(|link| meta.link_preview_text.get(&link.to_id))
        .map(|preview| preview_text(preview))
        .collect();
    meta.links.clear();
    meta.link_preview_text.clear();
    meta.rule = None;
    meta.phase_id = target.phase.phase_id.clone();
    meta.space = target.space;
    meta.lane = Lane::Agent;
    meta.owner = target.owner.to_string();
    meta.agent_id = Some(target.agent_id.to_string());
    meta.handoff = Some(HandoffMeta {
        packet_id: packet.packet_id.clone(),
        from_agent_id: packet.from_agent_id.clone(),
        to_agent_id: packet.to_agent_id.clone(),
    });
    factory.create(
        target.store_key,
        snapshot.kind,
        snapshot.text.clone(),
        snapshot.source,
        meta,
    )
}

/// Write a copy of every snapshot under the target key.
///
/// Copies carry handoff provenance instead of links; link previews survive
/// as redacted `handoff_link_previews`. Dedupe and authority order apply as
/// for any other write. Source items are left untouched.
pub fn apply_handoff_packet(
    packet: &HandoffPacket,
    stores: &mut MemoryStores,
    factory: &mut MemoryItemFactory,
    ledger: &mut PhaseLedger,
    links: &mut LinkTracker,
    target: &HandoffTarget<'_>,
    policy: &CommitPolicy,
) -> HandoffApplyOutcome {
    let mut outcome = HandoffApplyOutcome::default();
    for snapshot in &packet.snapshots {
        let copy = handoff_copy(factory, packet, snapshot, target);
        let committed = commit_item(stores, ledger, links, copy, policy);
        outcome.deleted.extend(committed.deleted);
        if committed.is_new {
            outcome.applied.push(committed.stored);
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{HandoffDraft, HandoffStore};
    use crate::item::{Authority, EventType, ItemMeta, MemoryKind};
    use crate::links::{Link, LinkType, MAX_LINKS};
    use crate::redaction::is_bracket_free;

    const FROM_KEY: &str = "project:demo:agent:agent-a";
    const TARGET_KEY: &str = "project:demo:agent:agent-b";

    fn target_phase() -> Phase {
        Phase {
            phase_id: "phase-1".into(),
            store_key: TARGET_KEY.into(),
            token: None,
            name: None,
            reason: "handoff".into(),
            created_at: 0,
        }
    }

    fn source_item(factory: &mut MemoryItemFactory, stores: &mut MemoryStores) -> MemoryItem {
        let mut meta = ItemMeta::new("phase-1", Space::Project, Lane::Agent, "demo")
            .with_agent(Some("agent-a"))
            .with_event_type(EventType::Decision);
        meta.links = vec![Link::new(LinkType::ConflictsWith, "older", "recency", "phase-1")];
        meta.link_preview_text.insert("older".into(), "Old [detail]".into());
        let item = factory.create(FROM_KEY, MemoryKind::Semantic, "Agent decision", Authority::User, meta);
        stores.semantic.store_item(item.clone(), false, &Authority::DEFAULT_ORDER);
        item
    }

    #[test]
    fn test_apply_copies_with_handoff_provenance() {
        let mut stores = MemoryStores::new();
        let mut factory = MemoryItemFactory::new();
        let mut ledger = PhaseLedger::new();
        let mut links = LinkTracker::new(MAX_LINKS);
        let phase = target_phase();
        ledger.start_phase(&phase, None);

        let source = source_item(&mut factory, &mut stores);
        let mut handoffs = HandoffStore::new();
        let packet = handoffs
            .create_packet(HandoffDraft {
                from_agent_id: "agent-a".into(),
                to_agent_id: "agent-b".into(),
                team_id: "team-1".into(),
                space: Space::Project,
                phase_id: "phase-1".into(),
                created_by: "owner-1".into(),
                items: vec![source.id.clone()],
                summary_lines: vec!["Handoff packet summary.".into()],
                snapshots: vec![source.clone()],
            })
            .unwrap();

        let target = HandoffTarget {
            store_key: TARGET_KEY,
            phase: &phase,
            space: Space::Project,
            owner: "demo",
            agent_id: "agent-b",
        };
        let outcome = apply_handoff_packet(
            &packet,
            &mut stores,
            &mut factory,
            &mut ledger,
            &mut links,
            &target,
            &CommitPolicy::default(),
        );

        assert_eq!(outcome.applied.len(), 1);
        let copy = &outcome.applied[0];
        assert_eq!(copy.store_key, TARGET_KEY);
        assert_eq!(copy.meta.agent_id.as_deref(), Some("agent-b"));
        assert_eq!(copy.meta.handoff.as_ref().unwrap().packet_id, packet.packet_id);
        assert!(copy.meta.links.is_empty());
        assert!(copy.meta.link_preview_text.is_empty());
        assert_eq!(copy.meta.handoff_link_previews, vec!["Old detail"]);
        assert!(is_bracket_free(&copy.meta.handoff_link_previews[0]));

        let original = stores.get(&source.id).unwrap();
        assert_eq!(original.meta.links.len(), 1);
        assert_eq!(ledger.entries(TARGET_KEY, "phase-1").len(), 1);
    }
}
