//! Agreement subsystem: team proposals and approval voting.
//!
//! - **Proposals** carry a frozen snapshot of the proposed item (a memory
//!   promotion or a rule) and collect distinct approvals until quorum.
//! - **Idempotent votes**: approving twice records once.
//! - **Owner override**: an owner approval satisfies quorum alone when the
//!   trust table allows it.

pub mod error;
pub mod proposal;
pub mod store;
pub mod summary;

pub use error::{AgreementError, AgreementResult};
pub use proposal::{AgreementAction, AgreementRequest, Proposal, ProposalDraft, ProposalStatus};
pub use store::ProposalStore;
pub use summary::{agreement_summary, AgreementCounts, AgreementSummary};
