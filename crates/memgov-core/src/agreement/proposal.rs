//! Proposals and agreement requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::AgreementError;
use crate::item::MemoryItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields supplied by the proposer.
#[derive(Debug, Clone)]
pub struct ProposalDraft {
    pub team_id: String,
    pub phase_id: String,
    pub memory_item: MemoryItem,
    pub proposed_by: String,
    pub reason_code: String,
    pub approval_count_required: usize,
    pub owner_override: bool,
    pub ai_profile: String,
}

/// A pending request to commit a memory item or install a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub team_id: String,
    /// Phase the proposal was created in.
    pub phase_id: String,
    /// Deep copy taken at creation; later store changes never reach it.
    pub memory_item: MemoryItem,
    pub proposed_by: String,
    pub reason_code: String,
    /// Distinct approvers in vote order.
    pub approvals: Vec<String>,
    pub approval_count_required: usize,
    pub owner_override: bool,
    pub status: ProposalStatus,
    pub ai_profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_phase_id: Option<String>,
}

impl Proposal {
    pub(crate) fn from_draft(proposal_id: String, draft: ProposalDraft) -> Self {
        Self {
            proposal_id,
            team_id: draft.team_id,
            phase_id: draft.phase_id,
            memory_item: draft.memory_item,
            proposed_by: draft.proposed_by,
            reason_code: draft.reason_code,
            approvals: Vec::new(),
            approval_count_required: draft.approval_count_required.max(1),
            owner_override: draft.owner_override,
            status: ProposalStatus::Pending,
            ai_profile: draft.ai_profile,
            decided_phase_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub fn quorum_reached(&self) -> bool {
        self.approvals.len() >= self.approval_count_required
    }

    /// Proposals that install a rule rather than promote a memory.
    pub fn is_rule(&self) -> bool {
        self.memory_item.meta.rule.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementAction {
    Approve,
    Reject,
}

impl AgreementAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for AgreementAction {
    type Err = AgreementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(AgreementError::UnknownAction(other.to_string())),
        }
    }
}

/// An approve or reject request. Without a proposal id the earliest
/// pending proposal of the team is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRequest {
    pub action: AgreementAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

impl AgreementRequest {
    pub fn approve(proposal_id: Option<&str>) -> Self {
        Self {
            action: AgreementAction::Approve,
            proposal_id: proposal_id.map(str::to_string),
            requested_by: None,
        }
    }

    pub fn reject(proposal_id: Option<&str>) -> Self {
        Self {
            action: AgreementAction::Reject,
            proposal_id: proposal_id.map(str::to_string),
            requested_by: None,
        }
    }

    pub fn with_requested_by(mut self, actor: impl Into<String>) -> Self {
        self.requested_by = Some(actor.into());
        self
    }
}
