//! Error types for scenario files and runs.

/// Malformed scenarios and run artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario id must be a non-empty path segment, got {0:?}")]
    InvalidId(String),

    #[error("step {step_index}: unknown step kind {kind:?}")]
    UnknownStepKind { step_index: usize, kind: String },

    #[error("step {step_index}: unsupported admin action {action:?}")]
    UnknownAdminAction { step_index: usize, action: String },

    #[error("step {step_index}: {field} is required")]
    MissingField { step_index: usize, field: String },

    #[error("step {step_index}: invalid payload: {reason}")]
    InvalidPayload { step_index: usize, reason: String },

    #[error("run digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}

impl ScenarioError {
    pub fn missing(step_index: usize, field: &str) -> Self {
        Self::MissingField {
            step_index,
            field: field.to_string(),
        }
    }
}

/// Result type for scenario parsing.
pub type ScenarioResult<T> = std::result::Result<T, ScenarioError>;
