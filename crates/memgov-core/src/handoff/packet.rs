//! Frozen handoff packets.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{HandoffError, HandoffResult};
use crate::digest::sha256_hex;
use crate::item::MemoryItem;
use crate::scope::Space;

/// Packet lifecycle: pending, then applied or rejected. Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Applied,
    Rejected,
}

impl HandoffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields supplied when creating a packet.
#[derive(Debug, Clone)]
pub struct HandoffDraft {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub team_id: String,
    pub space: Space,
    pub phase_id: String,
    pub created_by: String,
    /// Selected ids, rules included.
    pub items: Vec<String>,
    pub summary_lines: Vec<String>,
    /// Deep copies of the selected memory items.
    pub snapshots: Vec<MemoryItem>,
}

/// A curated bundle of memory moving from one agent to another.
///
/// The item list and snapshots are frozen at creation. `items_digest` is the
/// SHA-256 hex of the serialized snapshots; [`HandoffPacket::verify_integrity`]
/// re-derives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPacket {
    pub packet_id: String,
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub team_id: String,
    pub space: Space,
    pub phase_id: String,
    pub created_by: String,
    pub items: Vec<String>,
    pub summary_lines: Vec<String>,
    pub snapshots: Vec<MemoryItem>,
    pub items_digest: String,
    pub status: HandoffStatus,
}

fn snapshots_digest(snapshots: &[MemoryItem]) -> HandoffResult<String> {
    let bytes = serde_json::to_vec(snapshots)?;
    Ok(sha256_hex(&bytes))
}

impl HandoffPacket {
    pub(crate) fn from_draft(packet_id: String, draft: HandoffDraft) -> HandoffResult<Self> {
        let items_digest = snapshots_digest(&draft.snapshots)?;
        Ok(Self {
            packet_id,
            from_agent_id: draft.from_agent_id,
            to_agent_id: draft.to_agent_id,
            team_id: draft.team_id,
            space: draft.space,
            phase_id: draft.phase_id,
            created_by: draft.created_by,
            items: draft.items,
            summary_lines: draft.summary_lines,
            snapshots: draft.snapshots,
            items_digest,
            status: HandoffStatus::Pending,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == HandoffStatus::Pending
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns `IntegrityMismatch` when the snapshots were altered.
    pub fn verify_integrity(&self) -> HandoffResult<()> {
        let actual = snapshots_digest(&self.snapshots)?;
        if actual != self.items_digest {
            return Err(HandoffError::IntegrityMismatch {
                expected: self.items_digest.clone(),
                actual,
            });
        }
        Ok(())
    }
}
