//! Phase registry, append-only ledger and diffs.
//!
//! Every write is stamped with the current phase of its store key. A new
//! phase starts when a key is first written or when the caller supplies a
//! phase token different from the current one. Superseded phases move to
//! the key's history and are never rewritten.

pub mod diff;
pub mod ledger;
pub mod registry;

pub use diff::{diff_phases, phase_ids_between, PhaseDiff};
pub use ledger::{LedgerEntry, PhaseLedger};
pub use registry::{Phase, PhaseRegistry, PhaseRequest, PhaseSnapshot};
