//! Logical clock and deterministic id generation.
//!
//! Nothing here reads wall-clock time: two runs fed the same inputs produce
//! the same ticks and the same ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Monotonic logical clock. Every created item consumes one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryClock {
    tick: u64,
}

impl MemoryClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock and return the new tick.
    pub fn tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// The last tick handed out (0 before the first call to `tick`).
    pub fn current(&self) -> u64 {
        self.tick
    }
}

/// Per-scope monotonically increasing counters.
///
/// Ids are `{scope}:{label}:{n}` where `n` counts every id ever issued for
/// `scope`, so ids are never reused even after the item is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryIdGenerator {
    counters: BTreeMap<String, u64>,
}

impl MemoryIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next counter value for `scope`, starting at 1.
    pub fn next_counter(&mut self, scope: &str) -> u64 {
        let counter = self.counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Issue the next id for `scope` tagged with `label`.
    pub fn next_id(&mut self, scope: &str, label: &str) -> String {
        let n = self.next_counter(scope);
        format!("{scope}:{label}:{n}")
    }
}

/// Sequential ids with a fixed prefix, e.g. `proposal-1`, `handoff-2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceIds {
    prefix: String,
    next: u64,
}

impl SequenceIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn issue(&mut self) -> String {
        self.next += 1;
        format!("{}-{}", self.prefix, self.next)
    }
}
