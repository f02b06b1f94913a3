//! Error types for the handoff protocol.

/// Malformed handoff requests. Trust and rule denials are not errors.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff packet not found: {0}")]
    PacketNotFound(String),

    #[error("handoff packet {packet_id} is not pending, status is {status}")]
    NotPending { packet_id: String, status: String },

    #[error("handoff packet integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("handoff serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for handoff operations.
pub type HandoffResult<T> = std::result::Result<T, HandoffError>;
