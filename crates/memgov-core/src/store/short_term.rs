//! Bounded recency buffer of conversational turns.

use serde::{Deserialize, Serialize};

use super::factory::MemoryItemFactory;
use super::table::ItemTable;
use crate::item::{Authority, EventType, ItemMeta, MemoryItem, MemoryKind};

const SUMMARY_PREFIX: &str = "Summary: ";
const SUMMARY_SEPARATOR: &str = " | ";
const SUMMARY_MAX_PARTS: usize = 12;

/// Result of folding evicted turns into a summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub summary: Option<MemoryItem>,
    pub evicted: Vec<MemoryItem>,
    pub replaced_summary: Option<MemoryItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortTermMemory {
    table: ItemTable,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn table(&self) -> &ItemTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut ItemTable {
        &mut self.table
    }

    pub fn store_item(&mut self, item: MemoryItem) {
        self.table.push(item);
    }

    pub fn all_items(&self) -> &[MemoryItem] {
        self.table.all_items()
    }

    pub fn items_for_store(&self, store_key: &str) -> Vec<&MemoryItem> {
        self.table.items_for_store(store_key)
    }

    pub fn get(&self, id: &str) -> Option<&MemoryItem> {
        self.table.get(id)
    }

    pub fn delete_item(&mut self, store_key: &str, id: &str) -> Option<MemoryItem> {
        self.table.delete_item(store_key, id)
    }

    fn latest_summary(&self, store_key: &str) -> Option<&MemoryItem> {
        self.table
            .items_for_store(store_key)
            .into_iter()
            .rev()
            .find(|item| item.is_summary())
    }

    /// The current summary (if any) followed by the last `turns`
    /// conversational items, in insertion order.
    pub fn window(&self, store_key: &str, turns: usize) -> Vec<MemoryItem> {
        let mut out: Vec<MemoryItem> = self.latest_summary(store_key).cloned().into_iter().collect();
        let conversational: Vec<&MemoryItem> = self
            .table
            .items_for_store(store_key)
            .into_iter()
            .filter(|item| item.is_conversational())
            .collect();
        let skip = conversational.len().saturating_sub(turns);
        out.extend(conversational.into_iter().skip(skip).cloned());
        out
    }

    /// Evict the oldest turns beyond `max_turns` and fold them into a single
    /// summary item. A previous summary is folded in and removed.
    pub fn summarize_if_needed(
        &mut self,
        factory: &mut MemoryItemFactory,
        store_key: &str,
        max_turns: usize,
        meta: ItemMeta,
    ) -> SummaryOutcome {
        let conversational: Vec<String> = self
            .table
            .items_for_store(store_key)
            .into_iter()
            .filter(|item| item.is_conversational())
            .map(|item| item.id.clone())
            .collect();
        let overflow = conversational.len().saturating_sub(max_turns);
        if overflow == 0 {
            return SummaryOutcome::default();
        }

        let evicted: Vec<MemoryItem> = conversational[..overflow]
            .iter()
            .filter_map(|id| self.table.delete_item(store_key, id))
            .collect();

        let previous_id = self.latest_summary(store_key).map(|item| item.id.clone());
        let replaced_summary =
            previous_id.and_then(|id| self.table.delete_item(store_key, &id));

        let mut parts: Vec<String> = replaced_summary
            .as_ref()
            .map(|prev| {
                prev.text
                    .trim_start_matches(SUMMARY_PREFIX)
                    .split(SUMMARY_SEPARATOR)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        parts.extend(
            evicted
                .iter()
                .map(|item| format!("{}: {}", item.source, item.text.trim())),
        );
        let keep_from = parts.len().saturating_sub(SUMMARY_MAX_PARTS);
        let text = format!("{SUMMARY_PREFIX}{}", parts[keep_from..].join(SUMMARY_SEPARATOR));

        let mut summary_meta = meta.with_event_type(EventType::Summary);
        summary_meta.summary_of = evicted.iter().map(|item| item.id.clone()).collect();
        if let Some(prev) = &replaced_summary {
            summary_meta.summary_of.insert(0, prev.id.clone());
        }
        let summary = factory.create(
            store_key,
            MemoryKind::ShortTerm,
            text,
            Authority::System,
            summary_meta,
        );
        self.table.push(summary.clone());

        SummaryOutcome {
            summary: Some(summary),
            evicted,
            replaced_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Lane, Space};

    fn meta() -> ItemMeta {
        ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon")
    }

    fn push_turn(mem: &mut ShortTermMemory, factory: &mut MemoryItemFactory, text: &str) {
        let item = factory.create("session:anon", MemoryKind::ShortTerm, text, Authority::User, meta());
        mem.store_item(item);
    }

    #[test]
    fn test_no_summary_within_capacity() {
        let mut factory = MemoryItemFactory::new();
        let mut mem = ShortTermMemory::new();
        push_turn(&mut mem, &mut factory, "one");
        push_turn(&mut mem, &mut factory, "two");
        let outcome = mem.summarize_if_needed(&mut factory, "session:anon", 2, meta());
        assert!(outcome.summary.is_none());
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn test_eviction_folds_into_summary() {
        let mut factory = MemoryItemFactory::new();
        let mut mem = ShortTermMemory::new();
        for text in ["one", "two", "three"] {
            push_turn(&mut mem, &mut factory, text);
        }
        let outcome = mem.summarize_if_needed(&mut factory, "session:anon", 2, meta());
        let summary = outcome.summary.unwrap();
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(summary.meta.summary_of, vec!["session:anon:short_term:1"]);
        assert_eq!(summary.text, "Summary: user: one");

        let window = mem.window("session:anon", 2);
        let texts: Vec<&str> = window.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Summary: user: one", "two", "three"]);
    }

    #[test]
    fn test_second_fold_replaces_previous_summary() {
        let mut factory = MemoryItemFactory::new();
        let mut mem = ShortTermMemory::new();
        for text in ["one", "two", "three"] {
            push_turn(&mut mem, &mut factory, text);
        }
        let first = mem
            .summarize_if_needed(&mut factory, "session:anon", 2, meta())
            .summary
            .unwrap();
        push_turn(&mut mem, &mut factory, "four");
        let outcome = mem.summarize_if_needed(&mut factory, "session:anon", 2, meta());
        assert_eq!(outcome.replaced_summary.unwrap().id, first.id);
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.text, "Summary: user: one | user: two");
        assert_eq!(summary.meta.summary_of[0], first.id);
        let summaries = mem
            .items_for_store("session:anon")
            .into_iter()
            .filter(|i| i.is_summary())
            .count();
        assert_eq!(summaries, 1);
    }
}
