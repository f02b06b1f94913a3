//! In-memory packet store.

use serde::{Deserialize, Serialize};

use super::error::{HandoffError, HandoffResult};
use super::packet::{HandoffDraft, HandoffPacket, HandoffStatus};
use crate::clock::SequenceIds;

/// Packets in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffStore {
    packets: Vec<HandoffPacket>,
    ids: SequenceIds,
}

impl Default for HandoffStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffStore {
    pub fn new() -> Self {
        Self {
            packets: Vec::new(),
            ids: SequenceIds::new("handoff"),
        }
    }

    pub fn create_packet(&mut self, draft: HandoffDraft) -> HandoffResult<HandoffPacket> {
        let packet = HandoffPacket::from_draft(self.ids.issue(), draft)?;
        self.packets.push(packet.clone());
        Ok(packet)
    }

    pub fn get(&self, packet_id: &str) -> Option<&HandoffPacket> {
        self.packets.iter().find(|p| p.packet_id == packet_id)
    }

    /// The packet, provided it exists and is still pending.
    pub fn pending(&self, packet_id: &str) -> HandoffResult<&HandoffPacket> {
        let packet = self
            .get(packet_id)
            .ok_or_else(|| HandoffError::PacketNotFound(packet_id.to_string()))?;
        if !packet.is_pending() {
            return Err(HandoffError::NotPending {
                packet_id: packet_id.to_string(),
                status: packet.status.to_string(),
            });
        }
        Ok(packet)
    }

    pub fn apply_packet(&mut self, packet_id: &str) -> HandoffResult<HandoffPacket> {
        self.transition(packet_id, HandoffStatus::Applied)
    }

    pub fn reject_packet(&mut self, packet_id: &str) -> HandoffResult<HandoffPacket> {
        self.transition(packet_id, HandoffStatus::Rejected)
    }

    fn transition(&mut self, packet_id: &str, status: HandoffStatus) -> HandoffResult<HandoffPacket> {
        self.pending(packet_id)?;
        let packet = self
            .packets
            .iter_mut()
            .find(|p| p.packet_id == packet_id)
            .ok_or_else(|| HandoffError::PacketNotFound(packet_id.to_string()))?;
        packet.status = status;
        Ok(packet.clone())
    }

    pub fn list_packets(&self, team_id: &str) -> Vec<&HandoffPacket> {
        self.packets.iter().filter(|p| p.team_id == team_id).collect()
    }

    /// Earliest pending packet of `team_id`.
    pub fn first_pending(&self, team_id: &str) -> Option<&HandoffPacket> {
        self.packets
            .iter()
            .find(|p| p.team_id == team_id && p.is_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::HandoffError;
    use crate::item::{Authority, ItemMeta, MemoryItem, MemoryKind};
    use crate::scope::{Lane, Space};

    fn draft(items: &[&str]) -> HandoffDraft {
        let snapshots = items
            .iter()
            .map(|id| MemoryItem {
                id: (*id).into(),
                store_key: "project:demo:agent:agent-a".into(),
                kind: MemoryKind::Semantic,
                text: format!("Decision {id}"),
                source: Authority::User,
                created_at: 1,
                meta: ItemMeta::new("phase-1", Space::Project, Lane::Agent, "demo"),
            })
            .collect();
        HandoffDraft {
            from_agent_id: "agent-a".into(),
            to_agent_id: "agent-b".into(),
            team_id: "team-1".into(),
            space: Space::Project,
            phase_id: "phase-1".into(),
            created_by: "owner-1".into(),
            items: items.iter().map(|s| s.to_string()).collect(),
            summary_lines: vec!["Handoff packet summary.".into()],
            snapshots,
        }
    }

    #[test]
    fn test_packets_list_in_creation_order() {
        let mut store = HandoffStore::new();
        let a = store.create_packet(draft(&["id-1"])).unwrap();
        let b = store.create_packet(draft(&["id-2"])).unwrap();
        let ids: Vec<&str> = store
            .list_packets("team-1")
            .iter()
            .map(|p| p.packet_id.as_str())
            .collect();
        assert_eq!(ids, vec![a.packet_id.as_str(), b.packet_id.as_str()]);
        assert_eq!(a.packet_id, "handoff-1");
    }

    #[test]
    fn test_packet_applies_once() {
        let mut store = HandoffStore::new();
        let packet = store.create_packet(draft(&["id-1"])).unwrap();
        let applied = store.apply_packet(&packet.packet_id).unwrap();
        assert_eq!(applied.status, HandoffStatus::Applied);
        let err = store.apply_packet(&packet.packet_id).unwrap_err();
        assert!(matches!(err, HandoffError::NotPending { .. }));
        assert!(store.first_pending("team-1").is_none());
    }

    #[test]
    fn test_rejected_packet_cannot_be_applied() {
        let mut store = HandoffStore::new();
        let packet = store.create_packet(draft(&["id-1"])).unwrap();
        store.reject_packet(&packet.packet_id).unwrap();
        assert!(store.apply_packet(&packet.packet_id).is_err());
        assert!(matches!(
            store.apply_packet("handoff-9").unwrap_err(),
            HandoffError::PacketNotFound(_)
        ));
    }

    #[test]
    fn test_integrity_detects_tampering() {
        let mut store = HandoffStore::new();
        let mut packet = store.create_packet(draft(&["id-1", "id-2"])).unwrap();
        assert!(packet.verify_integrity().is_ok());
        packet.snapshots[0].text = "Tampered".into();
        assert!(matches!(
            packet.verify_integrity().unwrap_err(),
            HandoffError::IntegrityMismatch { .. }
        ));
    }
}
