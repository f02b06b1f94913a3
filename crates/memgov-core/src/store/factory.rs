//! Deterministic item construction.

use serde::{Deserialize, Serialize};

use crate::clock::{MemoryClock, MemoryIdGenerator};
use crate::item::{Authority, ItemMeta, MemoryItem, MemoryKind};

/// Stamps ids and logical creation ticks onto new items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryItemFactory {
    clock: MemoryClock,
    ids: MemoryIdGenerator,
}

impl MemoryItemFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an item for `store_key`. The id is `{store_key}:{kind}:{n}`.
    pub fn create(
        &mut self,
        store_key: &str,
        kind: MemoryKind,
        text: impl Into<String>,
        source: Authority,
        meta: ItemMeta,
    ) -> MemoryItem {
        let id = self.ids.next_id(store_key, kind.as_str());
        MemoryItem {
            id,
            store_key: store_key.to_string(),
            kind,
            text: text.into(),
            source,
            created_at: self.clock.tick(),
            meta,
        }
    }

    pub fn clock(&self) -> &MemoryClock {
        &self.clock
    }
}
