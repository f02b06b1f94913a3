//! Global atomic counters for governance activity.
//!
//! Counters are bumped at the call site. [`Metrics::flush`] emits current
//! values as one `tracing::info!` event, e.g. at the end of a scenario.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    recalls: AtomicU64,
    records: AtomicU64,
    items_written: AtomicU64,
    denials: AtomicU64,
    handoffs_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            recalls: AtomicU64::new(0),
            records: AtomicU64::new(0),
            items_written: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            handoffs_applied: AtomicU64::new(0),
        }
    }

    pub fn inc_recalls(&self) {
        self.recalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_written(&self, n: u64) {
        self.items_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_denials(&self) {
        self.denials.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "denials", "counter incremented");
    }

    pub fn inc_handoffs_applied(&self) {
        self.handoffs_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            recalls = self.recalls(),
            records = self.records(),
            items_written = self.items_written(),
            denials = self.denials(),
            handoffs_applied = self.handoffs_applied(),
        );
    }

    pub fn recalls(&self) -> u64 {
        self.recalls.load(Ordering::Relaxed)
    }

    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    pub fn denials(&self) -> u64 {
        self.denials.load(Ordering::Relaxed)
    }

    pub fn handoffs_applied(&self) -> u64 {
        self.handoffs_applied.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.recalls.store(0, Ordering::Relaxed);
        self.records.store(0, Ordering::Relaxed);
        self.items_written.store(0, Ordering::Relaxed);
        self.denials.store(0, Ordering::Relaxed);
        self.handoffs_applied.store(0, Ordering::Relaxed);
    }
}
