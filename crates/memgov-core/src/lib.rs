//! memgov core library
//!
//! Governed memory for agent runtimes: scoped stores with phase history,
//! typed links and impact analysis, trust levels and team rules, proposal
//! voting, agent handoffs and deterministic scenario replay.

pub mod agreement;
pub mod clock;
pub mod config;
pub mod digest;
pub mod error;
pub mod events;
pub mod facts;
pub mod handoff;
pub mod host;
pub mod impact;
pub mod item;
pub mod links;
pub mod manager;
pub mod metrics;
pub mod obs;
pub mod phase;
pub mod proof;
pub mod redaction;
pub mod rules;
pub mod scope;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod trust;

pub use error::{GovernanceError, Result};

pub use config::{AgentProfile, GovernanceConfig, GovernanceContext, MemoryConfig};

pub use item::{Authority, EventType, ItemMeta, MemoryItem, MemoryKind};

pub use scope::{agent_lane_key, store_key_for, Lane, Space, SpaceContext};

pub use links::{Link, LinkTracker, LinkType, MAX_LINKS};

pub use trust::{
    can_approve, can_change_rules, can_handoff_apply, can_handoff_create, can_handoff_reject,
    can_propose, can_reject, Identity, TrustAction, TrustDecision, TrustLevel, TrustRules,
};

pub use rules::{enforce_action, Rule, RuleAction, RuleCheckResult, RuleSpec};

pub use agreement::{
    AgreementAction, AgreementError, AgreementRequest, Proposal, ProposalStatus, ProposalStore,
};

pub use handoff::{HandoffError, HandoffPacket, HandoffStatus, HandoffStore};

pub use phase::{Phase, PhaseDiff, PhaseLedger, PhaseRegistry, PhaseRequest};

pub use impact::{compute_impact, render_impact, ImpactItem, ImpactResult};

pub use events::{MemoryEvent, MemoryTrace};

pub use manager::{
    CallContext, HandoffOutcome, HandoffRequest, Interaction, MemoryManager, RecallContext,
    RecallOutcome, RecordOutcome, RuleProposal, ToolEvent,
};

pub use proof::{run_scenario, Scenario, ScenarioError, ScenarioRun, ScenarioStep};

pub use host::SessionHost;

pub use digest::{compute_digest, digest_of, recall_hash};
