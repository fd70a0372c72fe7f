//! Event sinks.
//!
//! A sink accepts pre-serialized event lines from the client and appends
//! them durably. Sinks never re-serialize the payload; the only transform
//! allowed is a single defensive unwrap of an accidentally double-encoded
//! line, plus newline normalization.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod memory;
mod rotating;

pub use file::FileSink;
pub use memory::MemorySink;
pub use rotating::{BackpressureMode, ErrorCallback, RotatingFileSink, RotatingSinkOptions};

/// Errors surfaced by sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Appending to the live file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rotating the live file out of the way failed.
    #[error("rotation of {path} failed: {source}")]
    Rotate {
        /// The file that could not be rotated.
        path: PathBuf,
        /// The underlying failure.
        source: std::io::Error,
    },
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for serialized audit event lines.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Accept one line of text for durable append.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be accepted. Implementations may
    /// also absorb I/O failures internally and report them out of band.
    async fn write(&self, line: &str) -> SinkResult<()>;

    /// Wait until every accepted line has reached the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot complete the flush.
    async fn drain(&self) -> SinkResult<()>;

    /// Stop accepting lines, drain, and release the file handle.
    ///
    /// # Errors
    ///
    /// Returns an error if final teardown fails.
    async fn close(&self) -> SinkResult<()>;
}

/// Undo one accidental double-encoding (a JSON string wrapping a JSON
/// object), never more, and guarantee a single trailing newline.
pub(crate) fn normalize_line(line: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.len() > 1 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(trimmed) {
            let body = inner.trim();
            if body.starts_with('{') && body.ends_with('}') {
                let mut out = inner;
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                return out;
            }
        }
    }

    let mut out = line.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
