//! Error types for the agreement subsystem.

/// Malformed agreement requests. Trust denials are not errors.
#[derive(Debug, thiserror::Error)]
pub enum AgreementError {
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("proposal {proposal_id} is not pending: {status}")]
    NotPending { proposal_id: String, status: String },

    #[error("no pending proposal for team {0}")]
    NoPendingProposal(String),

    #[error("unknown agreement action: {0}")]
    UnknownAction(String),
}

/// Result type for agreement operations.
pub type AgreementResult<T> = std::result::Result<T, AgreementError>;
