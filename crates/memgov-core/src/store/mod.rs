//! Memory stores: short-term, semantic and profile.
//!
//! Each store keeps items in insertion order across all store keys. That
//! order is the only ordering guarantee; nothing is ever resorted.

pub mod commit;
pub mod factory;
pub mod profile;
pub mod semantic;
pub mod short_term;
pub mod table;

pub use commit::{commit_item, CommitOutcome, CommitPolicy, Deletion, DeletionReason};
pub use factory::MemoryItemFactory;
pub use profile::ProfileMemory;
pub use semantic::SemanticMemory;
pub use short_term::{ShortTermMemory, SummaryOutcome};
pub use table::{Conflict, ConflictRule, ItemTable, StoreOutcome};

use serde::{Deserialize, Serialize};

use crate::item::{MemoryItem, MemoryKind};

/// The three stores, owned together by the manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStores {
    pub short_term: ShortTermMemory,
    pub semantic: SemanticMemory,
    pub profile: ProfileMemory,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, kind: MemoryKind) -> &ItemTable {
        match kind {
            MemoryKind::ShortTerm => self.short_term.table(),
            MemoryKind::Semantic => self.semantic.table(),
            MemoryKind::Profile => self.profile.table(),
        }
    }

    fn table_mut(&mut self, kind: MemoryKind) -> &mut ItemTable {
        match kind {
            MemoryKind::ShortTerm => self.short_term.table_mut(),
            MemoryKind::Semantic => self.semantic.table_mut(),
            MemoryKind::Profile => self.profile.table_mut(),
        }
    }

    /// Look an item up by id in every store.
    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.short_term
            .get(id)
            .or_else(|| self.semantic.get(id))
            .or_else(|| self.profile.get(id))
    }

    /// Rewrite an item in place. Returns false when the id is unknown.
    pub fn update_item<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(MemoryItem) -> MemoryItem,
    {
        let kind = match self.get(id) {
            Some(item) => item.kind,
            None => return false,
        };
        self.table_mut(kind).update(id, f)
    }

    /// Remove an item from the store for `kind`.
    pub fn delete_item(&mut self, kind: MemoryKind, store_key: &str, id: &str) -> Option<MemoryItem> {
        self.table_mut(kind).delete_item(store_key, id)
    }

    /// Every item: short-term, then semantic, then profile.
    pub fn all_items(&self) -> impl Iterator<Item = &MemoryItem> {
        self.short_term
            .all_items()
            .iter()
            .chain(self.semantic.all_items())
            .chain(self.profile.all_items())
    }

    pub fn counts(&self) -> MemoryCounts {
        MemoryCounts {
            short_term: self.short_term.all_items().len(),
            semantic: self.semantic.all_items().len(),
            profile: self.profile.all_items().len(),
        }
    }
}

/// Item totals per store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCounts {
    pub short_term: usize,
    pub semantic: usize,
    pub profile: usize,
}
