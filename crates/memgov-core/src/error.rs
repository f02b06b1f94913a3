//! Crate-level error taxonomy for memgov.
//!
//! Only malformed requests are errors. Governance denials are ordinary
//! values (`TrustDecision`, `RuleCheckResult`) carried inside trace events.

use crate::agreement::AgreementError;
use crate::config::ConfigError;
use crate::handoff::HandoffError;
use crate::proof::ScenarioError;

/// memgov errors.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("{action} requires {field}")]
    MissingField { action: String, field: String },

    #[error("memory item not found: {0}")]
    ItemNotFound(String),

    #[error("non-canonical value: {0}")]
    NonCanonical(String),

    #[error("agreement error: {0}")]
    Agreement(#[from] AgreementError),

    #[error("handoff error: {0}")]
    Handoff(#[from] HandoffError),

    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GovernanceError {
    pub fn missing_field(action: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            action: action.into(),
            field: field.into(),
        }
    }
}

/// Result type for memgov operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = GovernanceError::missing_field("propose_rule", "payload.text");
        assert_eq!(err.to_string(), "propose_rule requires payload.text");
    }

    #[test]
    fn test_wrapped_handoff_error() {
        let err: GovernanceError = HandoffError::PacketNotFound("handoff-9".into()).into();
        assert!(err.to_string().contains("handoff-9"));
    }
}
