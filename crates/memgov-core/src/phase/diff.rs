//! Diffs between two phases of one store key.

use serde::{Deserialize, Serialize};

use super::ledger::{LedgerEntry, PhaseLedger};
use crate::redaction::sanitize_line;

const TOP_CHANGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDiff {
    pub store_key: String,
    pub from_phase_id: String,
    pub to_phase_id: String,
    pub added: Vec<LedgerEntry>,
    pub deleted: Vec<LedgerEntry>,
    /// `(before, after)` pairs sharing a dedup key.
    pub replaced: Vec<(LedgerEntry, LedgerEntry)>,
}

impl PhaseDiff {
    /// Every change as a line, ordered by the affected item's creation.
    pub fn change_lines(&self) -> Vec<String> {
        let mut changes: Vec<(u64, String)> = Vec::new();
        for entry in &self.added {
            changes.push((
                entry.created_at,
                format!("Added {} {}.", entry.memory_id, entry.preview),
            ));
        }
        for entry in &self.deleted {
            changes.push((
                entry.created_at,
                format!("Deleted {} {}.", entry.memory_id, entry.preview),
            ));
        }
        for (before, after) in &self.replaced {
            changes.push((
                after.created_at,
                format!(
                    "Replaced {} with {} {}.",
                    before.memory_id, after.memory_id, after.preview
                ),
            ));
        }
        changes.sort_by_key(|(created_at, _)| *created_at);
        changes
            .into_iter()
            .map(|(_, line)| sanitize_line(&line))
            .collect()
    }

    pub fn top_changes(&self) -> Vec<String> {
        self.change_lines().into_iter().take(TOP_CHANGES).collect()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("Added count is {}.", self.added.len()),
            format!("Deleted count is {}.", self.deleted.len()),
            format!("Replaced count is {}.", self.replaced.len()),
        ]
    }
}

/// Compare the item sets of two phases. Unknown phases are empty sets.
pub fn diff_phases(
    ledger: &PhaseLedger,
    store_key: &str,
    from_phase_id: &str,
    to_phase_id: &str,
) -> PhaseDiff {
    let before = ledger.entries(store_key, from_phase_id);
    let after = ledger.entries(store_key, to_phase_id);
    let contains = |set: &[LedgerEntry], id: &str| set.iter().any(|e| e.memory_id == id);

    let mut added: Vec<LedgerEntry> = after
        .iter()
        .filter(|e| !contains(before, &e.memory_id))
        .cloned()
        .collect();
    let mut deleted: Vec<LedgerEntry> = before
        .iter()
        .filter(|e| !contains(after, &e.memory_id))
        .cloned()
        .collect();

    let mut replaced = Vec::new();
    let mut remaining_added = Vec::new();
    for entry in added.drain(..) {
        let partner = entry.dedup_key.as_ref().and_then(|key| {
            deleted
                .iter()
                .position(|d| d.dedup_key.as_ref() == Some(key))
        });
        match partner {
            Some(pos) => replaced.push((deleted.remove(pos), entry)),
            None => remaining_added.push(entry),
        }
    }
    added = remaining_added;

    added.sort_by_key(|e| e.created_at);
    deleted.sort_by_key(|e| e.created_at);
    replaced.sort_by_key(|(_, after)| after.created_at);

    PhaseDiff {
        store_key: store_key.to_string(),
        from_phase_id: from_phase_id.to_string(),
        to_phase_id: to_phase_id.to_string(),
        added,
        deleted,
        replaced,
    }
}

/// Phase ids from `from` to `to` inclusive in ledger order. Reversed when
/// `from` is later; just the two ids when either is unknown.
pub fn phase_ids_between(
    ledger: &PhaseLedger,
    store_key: &str,
    from_phase_id: &str,
    to_phase_id: &str,
) -> Vec<String> {
    let order = ledger.phase_ids(store_key);
    let fallback = || {
        if from_phase_id == to_phase_id {
            vec![from_phase_id.to_string()]
        } else {
            vec![from_phase_id.to_string(), to_phase_id.to_string()]
        }
    };
    let (Some(start), Some(end)) = (
        order.iter().position(|p| p == from_phase_id),
        order.iter().position(|p| p == to_phase_id),
    ) else {
        return fallback();
    };
    if start <= end {
        order[start..=end].to_vec()
    } else {
        let mut subset = order[end..=start].to_vec();
        subset.reverse();
        subset
    }
}
