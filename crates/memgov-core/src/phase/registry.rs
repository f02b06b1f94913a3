//! Current phase per store key plus superseded history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A checkpoint stamped on writes to one store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub phase_id: String,
    pub store_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub reason: String,
    /// Logical tick when the phase started.
    pub created_at: u64,
}

/// Caller-supplied phase token with optional name and reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PhaseRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            name: None,
            reason: None,
        }
    }
}

/// Phase ids recorded for one store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    pub store_key: String,
    pub current_phase_id: Option<String>,
    pub history_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseRegistry {
    current: BTreeMap<String, Phase>,
    history: BTreeMap<String, Vec<Phase>>,
    counters: BTreeMap<String, u64>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, store_key: &str) -> Option<&Phase> {
        self.current.get(store_key)
    }

    pub fn history(&self, store_key: &str) -> &[Phase] {
        self.history
            .get(store_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Start a new phase for `store_key`, pushing the current one to history.
    pub fn advance(
        &mut self,
        store_key: &str,
        token: Option<&str>,
        name: Option<&str>,
        reason: &str,
        tick: u64,
    ) -> Phase {
        let counter = self.counters.entry(store_key.to_string()).or_insert(0);
        *counter += 1;
        let phase = Phase {
            phase_id: format!("phase-{counter}"),
            store_key: store_key.to_string(),
            token: token.map(str::to_string),
            name: name.map(str::to_string),
            reason: reason.to_string(),
            created_at: tick,
        };
        if let Some(previous) = self.current.insert(store_key.to_string(), phase.clone()) {
            self.history
                .entry(store_key.to_string())
                .or_default()
                .push(previous);
        }
        phase
    }

    /// Current phase, starting one when none exists or when `request`
    /// carries a token other than the current phase's. Returns whether a
    /// phase was started.
    pub fn ensure_phase(
        &mut self,
        store_key: &str,
        request: Option<&PhaseRequest>,
        default_reason: &str,
        tick: u64,
    ) -> (Phase, bool) {
        if let Some(current) = self.current.get(store_key) {
            let token_changed =
                request.is_some_and(|r| current.token.as_deref() != Some(r.token.as_str()));
            if !token_changed {
                return (current.clone(), false);
            }
        }
        let phase = match request {
            Some(r) => self.advance(
                store_key,
                Some(&r.token),
                r.name.as_deref(),
                r.reason.as_deref().unwrap_or(default_reason),
                tick,
            ),
            None => self.advance(store_key, None, None, default_reason, tick),
        };
        (phase, true)
    }

    /// Every store key with its current phase and history ids, sorted by key.
    pub fn snapshot(&self) -> Vec<PhaseSnapshot> {
        self.current
            .iter()
            .map(|(store_key, current)| PhaseSnapshot {
                store_key: store_key.clone(),
                current_phase_id: Some(current.phase_id.clone()),
                history_ids: self
                    .history(store_key)
                    .iter()
                    .map(|p| p.phase_id.clone())
                    .collect(),
            })
            .collect()
    }
}
