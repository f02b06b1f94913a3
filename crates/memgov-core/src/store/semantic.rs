//! Durable propositions: decisions, facts, rules, tool provenance.

use serde::{Deserialize, Serialize};

use super::table::{ItemTable, StoreOutcome};
use crate::item::{Authority, MemoryItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticMemory {
    table: ItemTable,
}

impl SemanticMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn table(&self) -> &ItemTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut ItemTable {
        &mut self.table
    }

    pub fn store_item(
        &mut self,
        item: MemoryItem,
        dedupe_enabled: bool,
        authority_order: &[Authority],
    ) -> StoreOutcome {
        self.table.store_keyed(item, dedupe_enabled, authority_order)
    }

    pub fn all_items(&self) -> &[MemoryItem] {
        self.table.all_items()
    }

    pub fn items_for_store(&self, store_key: &str) -> Vec<&MemoryItem> {
        self.table.items_for_store(store_key)
    }

    /// The `limit` most recent items of `store_key`, oldest first.
    pub fn recent(&self, store_key: &str, limit: usize) -> Vec<MemoryItem> {
        let items = self.table.items_for_store(store_key);
        let skip = items.len().saturating_sub(limit);
        items.into_iter().skip(skip).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.table.get(id)
    }

    pub fn delete_item(&mut self, store_key: &str, id: &str) -> Option<MemoryItem> {
        self.table.delete_item(store_key, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemMeta, MemoryKind};
    use crate::scope::{Lane, Space};
    use crate::store::MemoryItemFactory;

    #[test]
    fn test_recent_keeps_insertion_order() {
        let mut factory = MemoryItemFactory::new();
        let mut mem = SemanticMemory::new();
        for text in ["a", "b", "c"] {
            let meta = ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon");
            let item = factory.create("session:anon", MemoryKind::Semantic, text, Authority::User, meta);
            mem.store_item(item, true, &Authority::DEFAULT_ORDER);
        }
        let texts: Vec<String> = mem.recent("session:anon", 2).into_iter().map(|i| i.text).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert!(mem.recent("session:other", 2).is_empty());
    }
}
