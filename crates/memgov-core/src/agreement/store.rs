//! In-memory proposal store.

use serde::{Deserialize, Serialize};

use super::error::{AgreementError, AgreementResult};
use super::proposal::{Proposal, ProposalDraft, ProposalStatus};
use super::summary::AgreementCounts;
use crate::clock::SequenceIds;

/// Proposals in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalStore {
    proposals: Vec<Proposal>,
    ids: SequenceIds,
}

impl Default for ProposalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalStore {
    pub fn new() -> Self {
        Self {
            proposals: Vec::new(),
            ids: SequenceIds::new("proposal"),
        }
    }

    pub fn create_proposal(&mut self, draft: ProposalDraft) -> Proposal {
        let proposal = Proposal::from_draft(self.ids.issue(), draft);
        self.proposals.push(proposal.clone());
        proposal
    }

    pub fn get(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.proposal_id == proposal_id)
    }

    fn pending_mut(&mut self, proposal_id: &str) -> AgreementResult<&mut Proposal> {
        let proposal = self
            .proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal_id)
            .ok_or_else(|| AgreementError::ProposalNotFound(proposal_id.to_string()))?;
        if !proposal.is_pending() {
            return Err(AgreementError::NotPending {
                proposal_id: proposal_id.to_string(),
                status: proposal.status.to_string(),
            });
        }
        Ok(proposal)
    }

    /// Append `actor_id` to the approvals. A repeat vote changes nothing and
    /// reports `false`.
    pub fn record_approval(
        &mut self,
        proposal_id: &str,
        actor_id: &str,
    ) -> AgreementResult<(Proposal, bool)> {
        let proposal = self.pending_mut(proposal_id)?;
        if proposal.approvals.iter().any(|a| a == actor_id) {
            return Ok((proposal.clone(), false));
        }
        proposal.approvals.push(actor_id.to_string());
        Ok((proposal.clone(), true))
    }

    pub fn approve(&mut self, proposal_id: &str, phase_id: &str) -> AgreementResult<Proposal> {
        self.decide(proposal_id, phase_id, ProposalStatus::Approved)
    }

    pub fn reject(&mut self, proposal_id: &str, phase_id: &str) -> AgreementResult<Proposal> {
        self.decide(proposal_id, phase_id, ProposalStatus::Rejected)
    }

    fn decide(
        &mut self,
        proposal_id: &str,
        phase_id: &str,
        status: ProposalStatus,
    ) -> AgreementResult<Proposal> {
        let proposal = self.pending_mut(proposal_id)?;
        proposal.status = status;
        proposal.decided_phase_id = Some(phase_id.to_string());
        Ok(proposal.clone())
    }

    /// Earliest pending proposal of `team_id`, optionally a specific one.
    pub fn select_pending(&self, team_id: &str, proposal_id: Option<&str>) -> Option<&Proposal> {
        self.select_pending_where(team_id, |p| {
            proposal_id.map_or(true, |id| p.proposal_id == id)
        })
    }

    /// Earliest pending proposal of `team_id` matching `filter`.
    pub fn select_pending_where<F>(&self, team_id: &str, filter: F) -> Option<&Proposal>
    where
        F: Fn(&Proposal) -> bool,
    {
        self.proposals
            .iter()
            .find(|p| p.team_id == team_id && p.is_pending() && filter(p))
    }

    pub fn list_pending(&self, team_id: &str) -> Vec<&Proposal> {
        self.proposals
            .iter()
            .filter(|p| p.team_id == team_id && p.is_pending())
            .collect()
    }

    pub fn list(&self, team_id: &str) -> Vec<&Proposal> {
        self.proposals
            .iter()
            .filter(|p| p.team_id == team_id)
            .collect()
    }

    /// Counts for proposals created or decided in any of `phase_ids`.
    pub fn counts_for_phases(&self, team_id: &str, phase_ids: &[String]) -> AgreementCounts {
        let mut counts = AgreementCounts::default();
        let in_range = |id: &str| phase_ids.iter().any(|p| p == id);
        for proposal in self.list(team_id) {
            if in_range(&proposal.phase_id) {
                counts.proposed += 1;
                if proposal.is_pending() {
                    counts.pending += 1;
                }
            }
            if proposal.decided_phase_id.as_deref().is_some_and(in_range) {
                match proposal.status {
                    ProposalStatus::Approved => counts.approved += 1,
                    ProposalStatus::Rejected => counts.rejected += 1,
                    ProposalStatus::Pending => {}
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Authority, ItemMeta, MemoryItem, MemoryKind};
    use crate::scope::{Lane, Space};

    fn draft(team: &str) -> ProposalDraft {
        ProposalDraft {
            team_id: team.into(),
            phase_id: "phase-1".into(),
            memory_item: MemoryItem {
                id: "session:anon:semantic:1".into(),
                store_key: "session:anon".into(),
                kind: MemoryKind::Semantic,
                text: "We use Postgres".into(),
                source: Authority::User,
                created_at: 1,
                meta: ItemMeta::new("phase-1", Space::Session, Lane::Agent, "anon"),
            },
            proposed_by: "alice".into(),
            reason_code: "team".into(),
            approval_count_required: 2,
            owner_override: true,
            ai_profile: "assistant".into(),
        }
    }

    #[test]
    fn test_record_approval_is_idempotent() {
        let mut store = ProposalStore::new();
        let p = store.create_proposal(draft("t"));
        let (_, first) = store.record_approval(&p.proposal_id, "alice").unwrap();
        let (after, second) = store.record_approval(&p.proposal_id, "alice").unwrap();
        assert_eq!((first, second), (true, false));
        assert_eq!(after.approvals.len(), 1);
    }

    #[test]
    fn test_quorum_needs_distinct_actors() {
        let mut store = ProposalStore::new();
        let p = store.create_proposal(draft("t"));
        let (one, _) = store.record_approval(&p.proposal_id, "alice").unwrap();
        assert!(!one.quorum_reached());
        let (two, _) = store.record_approval(&p.proposal_id, "bob").unwrap();
        assert!(two.quorum_reached());
    }

    #[test]
    fn test_select_pending_is_creation_order() {
        let mut store = ProposalStore::new();
        let first = store.create_proposal(draft("t"));
        let second = store.create_proposal(draft("t"));
        store.create_proposal(draft("other"));
        assert_eq!(store.select_pending("t", None).unwrap().proposal_id, first.proposal_id);
        store.reject(&first.proposal_id, "phase-2").unwrap();
        assert_eq!(store.select_pending("t", None).unwrap().proposal_id, second.proposal_id);
        assert!(store.select_pending("t", Some(&first.proposal_id)).is_none());
        assert_eq!(store.list_pending("t").len(), 1);
    }

    #[test]
    fn test_decided_proposal_rejects_votes() {
        let mut store = ProposalStore::new();
        let p = store.create_proposal(draft("t"));
        store.reject(&p.proposal_id, "phase-1").unwrap();
        let err = store.record_approval(&p.proposal_id, "bob").unwrap_err();
        assert!(matches!(err, AgreementError::NotPending { .. }));
        assert!(matches!(
            store.approve("proposal-99", "phase-1").unwrap_err(),
            AgreementError::ProposalNotFound(_)
        ));
    }

    #[test]
    fn test_counts_for_phases() {
        let mut store = ProposalStore::new();
        let a = store.create_proposal(draft("t"));
        store.create_proposal(draft("t"));
        store.approve(&a.proposal_id, "phase-2").unwrap();
        let counts = store.counts_for_phases("t", &["phase-1".into(), "phase-2".into()]);
        assert_eq!(counts.proposed, 2);
        assert_eq!(counts.approved, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.rejected, 0);
    }
}
