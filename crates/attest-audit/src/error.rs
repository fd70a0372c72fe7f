//! Audit-related error types.

use thiserror::Error;

use crate::sink::SinkError;

/// Errors that can occur while signing or verifying audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Canonical encoding of the signing envelope failed.
    #[error("canonical encoding failed: {0}")]
    Encode(#[from] attest_canonical::EncodeError),

    /// Event (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sink rejected a write.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// An I/O operation outside the sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
