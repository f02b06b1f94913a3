//! Insertion-ordered item table with dedupe and authority-aware conflicts.

use serde::{Deserialize, Serialize};

use crate::item::{normalize_text, Authority, MemoryItem};

/// Why a conflict was decided the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    /// The winner has strictly higher authority.
    Authority,
    /// Equal authority; the newer item wins.
    Recency,
}

impl ConflictRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::Recency => "recency",
        }
    }
}

/// Two items sharing a dedup key with different text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub winner: MemoryItem,
    pub loser: MemoryItem,
    pub rule: ConflictRule,
}

/// Result of a keyed store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    /// The item that now holds the slot: the new item, or the existing one
    /// on dedupe or when the new item lost a conflict.
    pub stored: MemoryItem,
    pub is_new: bool,
    pub conflict: Option<Conflict>,
    /// Existing item removed because it lost to the new one.
    pub deleted: Option<MemoryItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTable {
    items: Vec<MemoryItem>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: MemoryItem) {
        self.items.push(item);
    }

    pub fn all_items(&self) -> &[MemoryItem] {
        &self.items
    }

    pub fn items_for_store(&self, store_key: &str) -> Vec<&MemoryItem> {
        self.items
            .iter()
            .filter(|item| item.store_key == store_key)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn delete_item(&mut self, store_key: &str, id: &str) -> Option<MemoryItem> {
        let pos = self
            .items
            .iter()
            .position(|item| item.id == id && item.store_key == store_key)?;
        Some(self.items.remove(pos))
    }

    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(MemoryItem) -> MemoryItem,
    {
        match self.items.iter().position(|item| item.id == id) {
            Some(pos) => {
                let current = self.items[pos].clone();
                self.items[pos] = f(current);
                true
            }
            None => false,
        }
    }

    /// Store with dedupe and conflict resolution.
    ///
    /// - same normalised text in the same store key: existing item returned
    ///   unchanged (dedupe enabled only)
    /// - same dedup key, different text: authority decides; equal authority
    ///   lets the newer item win; a lower authority never overwrites
    pub fn store_keyed(
        &mut self,
        item: MemoryItem,
        dedupe_enabled: bool,
        authority_order: &[Authority],
    ) -> StoreOutcome {
        if dedupe_enabled {
            let normalized = item.normalized_text();
            if let Some(existing) = self.items.iter().find(|e| {
                e.store_key == item.store_key && normalize_text(&e.text) == normalized
            }) {
                return StoreOutcome {
                    stored: existing.clone(),
                    is_new: false,
                    conflict: None,
                    deleted: None,
                };
            }
        }

        let rival = item.meta.dedup_key.as_ref().and_then(|key| {
            self.items.iter().position(|e| {
                e.store_key == item.store_key
                    && e.meta.dedup_key.as_ref() == Some(key)
                    && e.normalized_text() != item.normalized_text()
            })
        });

        let Some(pos) = rival else {
            self.items.push(item.clone());
            return StoreOutcome {
                stored: item,
                is_new: true,
                conflict: None,
                deleted: None,
            };
        };

        let new_rank = item.source.rank_in(authority_order);
        let old_rank = self.items[pos].source.rank_in(authority_order);
        if new_rank <= old_rank {
            let rule = if new_rank < old_rank {
                ConflictRule::Authority
            } else {
                ConflictRule::Recency
            };
            let loser = self.items.remove(pos);
            self.items.push(item.clone());
            StoreOutcome {
                stored: item.clone(),
                is_new: true,
                conflict: Some(Conflict {
                    winner: item,
                    loser: loser.clone(),
                    rule,
                }),
                deleted: Some(loser),
            }
        } else {
            let winner = self.items[pos].clone();
            StoreOutcome {
                stored: winner.clone(),
                is_new: false,
                conflict: Some(Conflict {
                    winner,
                    loser: item,
                    rule: ConflictRule::Authority,
                }),
                deleted: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemMeta, MemoryKind};
    use crate::scope::{Lane, Space};

    fn fact(id: &str, text: &str, source: Authority, created_at: u64) -> MemoryItem {
        MemoryItem {
            id: id.into(),
            store_key: "session:anon".into(),
            kind: MemoryKind::Profile,
            text: text.into(),
            source,
            created_at,
            meta: ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon")
                .with_dedup_key("fact:name"),
        }
    }

    // ------------------------------------------------------------------
    // Dedupe
    // ------------------------------------------------------------------

    #[test]
    fn test_dedupe_returns_existing() {
        let mut table = ItemTable::new();
        table.push(fact("a", "Ada", Authority::User, 1));
        let outcome = table.store_keyed(
            fact("b", "  ada ", Authority::User, 2),
            true,
            &Authority::DEFAULT_ORDER,
        );
        assert!(!outcome.is_new);
        assert_eq!(outcome.stored.id, "a");
        assert_eq!(table.all_items().len(), 1);
    }

    #[test]
    fn test_dedupe_disabled_stores_duplicate() {
        let mut table = ItemTable::new();
        table.push(fact("a", "Ada", Authority::User, 1));
        let outcome = table.store_keyed(fact("b", "Ada", Authority::User, 2), false, &[]);
        assert!(outcome.is_new);
        assert_eq!(table.all_items().len(), 2);
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    #[test]
    fn test_newer_equal_authority_wins() {
        let mut table = ItemTable::new();
        table.push(fact("a", "Ada", Authority::User, 1));
        let outcome = table.store_keyed(
            fact("b", "Grace", Authority::User, 2),
            true,
            &Authority::DEFAULT_ORDER,
        );
        let conflict = outcome.conflict.unwrap();
        assert_eq!(conflict.winner.id, "b");
        assert_eq!(conflict.rule, ConflictRule::Recency);
        assert_eq!(outcome.deleted.unwrap().id, "a");
        assert_eq!(table.all_items().len(), 1);
    }

    #[test]
    fn test_lower_authority_never_overwrites() {
        let mut table = ItemTable::new();
        table.push(fact("a", "Ada", Authority::User, 1));
        let outcome = table.store_keyed(
            fact("b", "Grace", Authority::Ai, 2),
            true,
            &Authority::DEFAULT_ORDER,
        );
        assert!(!outcome.is_new);
        assert!(outcome.deleted.is_none());
        assert_eq!(outcome.conflict.unwrap().loser.id, "b");
        assert_eq!(table.get("a").unwrap().text, "Ada");
        assert!(table.get("b").is_none());
    }

    #[test]
    fn test_higher_authority_replaces() {
        let mut table = ItemTable::new();
        table.push(fact("a", "Ada", Authority::Ai, 1));
        let outcome = table.store_keyed(
            fact("b", "Grace", Authority::System, 2),
            true,
            &Authority::DEFAULT_ORDER,
        );
        assert_eq!(outcome.conflict.unwrap().rule, ConflictRule::Authority);
        assert_eq!(table.all_items()[0].id, "b");
    }
}
