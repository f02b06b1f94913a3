//! Structured tracing hooks for governance lifecycle events.
//!
//! Every hook logs a stable `event` field. Only ids, counts, levels and
//! already-redacted reasons are logged; item text never is.

use tracing::{info, warn};

/// RAII guard that enters a session-scoped span.
///
/// ```ignore
/// let _span = SessionSpan::enter("anon");
/// // tracing calls below carry session_id = "anon"
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("memgov.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_recall(session_id: &str, item_count: usize, recall_hash: &str) {
    info!(
        event = "memory.recall",
        session_id = %session_id,
        item_count = item_count,
        recall_hash = %recall_hash,
    );
}

pub fn emit_record(session_id: &str, written: usize, trace_count: usize) {
    info!(
        event = "memory.record",
        session_id = %session_id,
        written = written,
        traces = trace_count,
    );
}

/// A governed action was refused by a rule or the trust table.
pub fn emit_denied(action: &str, actor_id: &str, reason: &str) {
    warn!(event = "governance.denied", action = %action, actor_id = %actor_id, reason = %reason);
}

pub fn emit_proposal_decided(proposal_id: &str, status: &str, approvals: usize) {
    info!(
        event = "proposal.decided",
        proposal_id = %proposal_id,
        status = %status,
        approvals = approvals,
    );
}

pub fn emit_handoff_created(packet_id: &str, item_count: usize) {
    info!(event = "handoff.created", packet_id = %packet_id, item_count = item_count);
}

pub fn emit_handoff_applied(packet_id: &str, applied: usize) {
    info!(event = "handoff.applied", packet_id = %packet_id, applied = applied);
}

pub fn emit_phase_started(store_key: &str, phase_id: &str, reason: &str) {
    info!(event = "phase.started", store_key = %store_key, phase_id = %phase_id, reason = %reason);
}

pub fn emit_scenario_started(scenario_id: &str, steps: usize) {
    info!(event = "scenario.started", scenario_id = %scenario_id, steps = steps);
}

pub fn emit_scenario_finished(scenario_id: &str, traces: usize, digest: &str) {
    info!(
        event = "scenario.finished",
        scenario_id = %scenario_id,
        traces = traces,
        digest = %digest,
    );
}
