//! Canonical-encoding error types.

use thiserror::Error;

/// Errors that can occur while canonically encoding a value.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A reference cycle was found and the cycle policy is
    /// [`CyclePolicy::Error`](crate::CyclePolicy::Error).
    #[error("cycle detected during canonical encoding")]
    CycleDetected,

    /// The assembled canonical tree could not be rendered as JSON.
    #[error("JSON rendering failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for canonical encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;
