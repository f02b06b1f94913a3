//! Committing items to a store with conflict links and ledger bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::table::Conflict;
use super::MemoryStores;
use crate::item::{Authority, MemoryItem, MemoryKind};
use crate::links::{Link, LinkTracker, LinkType};
use crate::phase::PhaseLedger;

/// Why an item left its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    /// Evicted from the short-term window.
    Expired,
    /// Superseded by a newer summary.
    Replaced,
    /// Moved to another space.
    Promoted,
    /// Lost a same-fact conflict.
    ConflictLoser,
}

impl DeletionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Replaced => "replaced",
            Self::Promoted => "promoted",
            Self::ConflictLoser => "conflict_loser",
        }
    }
}

impl fmt::Display for DeletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item removed during a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub item: MemoryItem,
    pub reason: DeletionReason,
}

/// Dedupe and authority settings applied to durable writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPolicy {
    pub dedupe_enabled: bool,
    pub authority_order: Vec<Authority>,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            dedupe_enabled: true,
            authority_order: Authority::DEFAULT_ORDER.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Item holding the slot after the write.
    pub stored: MemoryItem,
    pub is_new: bool,
    pub conflict: Option<Conflict>,
    pub deleted: Vec<Deletion>,
}

/// Store `item` in the store for its kind.
///
/// Semantic and profile writes go through dedupe and conflict resolution.
/// The conflict winner gains a `conflicts_with` link to the loser, and a new
/// winner also gains a `replaced` link. The ledger sees every add and delete
/// under the item's phase.
pub fn commit_item(
    stores: &mut MemoryStores,
    ledger: &mut PhaseLedger,
    links: &mut LinkTracker,
    item: MemoryItem,
    policy: &CommitPolicy,
) -> CommitOutcome {
    let phase_id = item.meta.phase_id.clone();
    let store_key = item.store_key.clone();
    let outcome = match item.kind {
        MemoryKind::ShortTerm => {
            stores.short_term.store_item(item.clone());
            ledger.record_add(&store_key, &phase_id, &item);
            return CommitOutcome {
                stored: item,
                is_new: true,
                conflict: None,
                deleted: Vec::new(),
            };
        }
        MemoryKind::Semantic => {
            stores
                .semantic
                .store_item(item, policy.dedupe_enabled, &policy.authority_order)
        }
        MemoryKind::Profile => {
            stores
                .profile
                .store_item(item, policy.dedupe_enabled, &policy.authority_order)
        }
    };

    let mut deleted = Vec::new();
    if outcome.is_new {
        ledger.record_add(&store_key, &phase_id, &outcome.stored);
    }
    if let Some(loser) = &outcome.deleted {
        ledger.record_delete(&store_key, &phase_id, &loser.id);
        deleted.push(Deletion {
            item: loser.clone(),
            reason: DeletionReason::ConflictLoser,
        });
    }

    if let Some(conflict) = &outcome.conflict {
        let winner_id = conflict.winner.id.clone();
        let rule = conflict.rule.as_str();
        links.add_link(
            stores,
            &winner_id,
            Link::new(LinkType::ConflictsWith, &conflict.loser.id, rule, &phase_id),
            Some(&conflict.loser.text),
        );
        if outcome.is_new {
            links.add_link(
                stores,
                &winner_id,
                Link::new(LinkType::Replaced, &conflict.loser.id, rule, &phase_id),
                Some(&conflict.loser.text),
            );
        }
    }

    // Links may have rewritten the stored item.
    let stored = stores
        .get(&outcome.stored.id)
        .cloned()
        .unwrap_or(outcome.stored);

    CommitOutcome {
        stored,
        is_new: outcome.is_new,
        conflict: outcome.conflict,
        deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemMeta;
    use crate::links::MAX_LINKS;
    use crate::phase::Phase;
    use crate::scope::{Lane, Space};
    use crate::store::MemoryItemFactory;

    fn setup() -> (MemoryStores, PhaseLedger, LinkTracker, MemoryItemFactory) {
        let mut ledger = PhaseLedger::new();
        ledger.start_phase(
            &Phase {
                phase_id: "phase-1".into(),
                store_key: "session:anon".into(),
                token: None,
                name: None,
                reason: "auto".into(),
                created_at: 0,
            },
            None,
        );
        (
            MemoryStores::new(),
            ledger,
            LinkTracker::new(MAX_LINKS),
            MemoryItemFactory::new(),
        )
    }

    fn fact(factory: &mut MemoryItemFactory, text: &str, source: Authority) -> MemoryItem {
        let meta = ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon")
            .with_dedup_key("fact:name");
        factory.create("session:anon", MemoryKind::Profile, text, source, meta)
    }

    #[test]
    fn test_newer_fact_links_and_deletes_loser() {
        let (mut stores, mut ledger, mut links, mut factory) = setup();
        let policy = CommitPolicy::default();
        let first = fact(&mut factory, "name is Ada", Authority::User);
        commit_item(&mut stores, &mut ledger, &mut links, first.clone(), &policy);
        let second = fact(&mut factory, "name is Grace", Authority::User);
        let outcome = commit_item(&mut stores, &mut ledger, &mut links, second, &policy);

        assert!(outcome.is_new);
        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.deleted[0].reason, DeletionReason::ConflictLoser);
        let types: Vec<LinkType> = outcome.stored.meta.links.iter().map(|l| l.link_type).collect();
        assert_eq!(types, vec![LinkType::ConflictsWith, LinkType::Replaced]);
        assert!(stores.get(&first.id).is_none());
        assert_eq!(ledger.entries("session:anon", "phase-1").len(), 1);
    }

    #[test]
    fn test_losing_write_only_links_existing_winner() {
        let (mut stores, mut ledger, mut links, mut factory) = setup();
        let policy = CommitPolicy::default();
        let first = fact(&mut factory, "name is Ada", Authority::User);
        commit_item(&mut stores, &mut ledger, &mut links, first.clone(), &policy);
        let weaker = fact(&mut factory, "name is Bot", Authority::Ai);
        let outcome = commit_item(&mut stores, &mut ledger, &mut links, weaker, &policy);

        assert!(!outcome.is_new);
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.stored.id, first.id);
        assert_eq!(outcome.stored.meta.links.len(), 1);
        assert_eq!(outcome.stored.meta.links[0].link_type, LinkType::ConflictsWith);
    }
}
