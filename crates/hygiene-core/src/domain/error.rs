//! Domain-level error taxonomy for hygiene audits.

use uuid::Uuid;

/// Errors produced by domain value construction and audit lifecycle rules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("confidence score must be between 0 and 100, got {value}")]
    InvalidConfidenceScore { value: f64 },

    #[error("audit {audit_id} already finalized by {reviewed_by}")]
    AlreadyFinalized { audit_id: Uuid, reviewed_by: String },

    #[error("invalid manual override: {0}")]
    InvalidOverride(String),

    #[error("invalid cleanliness rules: {0}")]
    InvalidRules(String),

    #[error("image not valid for analysis: {0}")]
    InvalidImage(String),

    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    #[error("invalid stored audit record: {0}")]
    InvalidAuditRecord(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = std::result::Result<T, DomainError>;
