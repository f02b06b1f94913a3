//! Append-only per-phase item ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::registry::Phase;
use crate::item::{MemoryItem, MemoryKind};
use crate::redaction::preview_text;

/// What the ledger remembers about an item. Previews are redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub memory_id: String,
    pub kind: MemoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    pub created_at: u64,
    pub preview: String,
}

impl LedgerEntry {
    pub fn from_item(item: &MemoryItem) -> Self {
        Self {
            memory_id: item.id.clone(),
            kind: item.kind,
            dedup_key: item.meta.dedup_key.clone(),
            created_at: item.created_at,
            preview: preview_text(&item.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PhaseItems {
    phase_id: String,
    entries: Vec<LedgerEntry>,
}

/// For each store key, the live item set as of every phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseLedger {
    phases: BTreeMap<String, Vec<PhaseItems>>,
}

impl PhaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `phase` for its store key, inheriting the previous phase's items.
    pub fn start_phase(&mut self, phase: &Phase, previous: Option<&Phase>) {
        let list = self.phases.entry(phase.store_key.clone()).or_default();
        let inherited = previous
            .and_then(|prev| list.iter().find(|p| p.phase_id == prev.phase_id))
            .map(|p| p.entries.clone())
            .unwrap_or_default();
        list.push(PhaseItems {
            phase_id: phase.phase_id.clone(),
            entries: inherited,
        });
    }

    fn phase_mut(&mut self, store_key: &str, phase_id: &str) -> Option<&mut PhaseItems> {
        self.phases
            .get_mut(store_key)?
            .iter_mut()
            .find(|p| p.phase_id == phase_id)
    }

    pub fn record_add(&mut self, store_key: &str, phase_id: &str, item: &MemoryItem) {
        if let Some(phase) = self.phase_mut(store_key, phase_id) {
            phase.entries.retain(|e| e.memory_id != item.id);
            phase.entries.push(LedgerEntry::from_item(item));
        }
    }

    pub fn record_delete(&mut self, store_key: &str, phase_id: &str, memory_id: &str) {
        if let Some(phase) = self.phase_mut(store_key, phase_id) {
            phase.entries.retain(|e| e.memory_id != memory_id);
        }
    }

    /// Phase ids of `store_key` in start order.
    pub fn phase_ids(&self, store_key: &str) -> Vec<String> {
        self.phases
            .get(store_key)
            .map(|list| list.iter().map(|p| p.phase_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Live items of `store_key` as of `phase_id`.
    pub fn entries(&self, store_key: &str, phase_id: &str) -> &[LedgerEntry] {
        self.phases
            .get(store_key)
            .and_then(|list| list.iter().find(|p| p.phase_id == phase_id))
            .map(|p| p.entries.as_slice())
            .unwrap_or_default()
    }
}
