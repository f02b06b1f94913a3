//! Durable per-actor attributes keyed by `fact:{key}`.

use serde::{Deserialize, Serialize};

use super::table::{ItemTable, StoreOutcome};
use crate::item::{Authority, MemoryItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileMemory {
    table: ItemTable,
}

impl ProfileMemory {
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

    /// Current value of a profile fact.
    pub fn fact(&self, store_key: &str, key: &str) -> Option<&MemoryItem> {
        self.table
            .items_for_store(store_key)
            .into_iter()
            .rev()
            .find(|item| item.meta.key.as_deref() == Some(key))
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

    fn name_fact(factory: &mut MemoryItemFactory, value: &str) -> MemoryItem {
        let mut meta = ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon")
            .with_dedup_key("fact:name");
        meta.key = Some("name".into());
        factory.create("session:anon", MemoryKind::Profile, value, Authority::User, meta)
    }

    #[test]
    fn test_fact_tracks_latest_value() {
        let mut factory = MemoryItemFactory::new();
        let mut mem = ProfileMemory::new();
        let first = name_fact(&mut factory, "Ada");
        mem.store_item(first, true, &Authority::DEFAULT_ORDER);
        let second = name_fact(&mut factory, "Grace");
        let outcome = mem.store_item(second, true, &Authority::DEFAULT_ORDER);
        assert!(outcome.conflict.is_some());
        assert_eq!(mem.fact("session:anon", "name").unwrap().text, "Grace");
        assert_eq!(mem.all_items().len(), 1);
    }
}
