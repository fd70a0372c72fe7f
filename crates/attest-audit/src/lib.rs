//! Attest Audit - tamper-evident signed audit logging.
//!
//! This crate provides:
//! - Deterministically signed audit events (HMAC-SHA256 over a canonical
//!   encoding)
//! - Chain-linked events (each carries the signature of its predecessor)
//! - Async sinks with rotation and backpressure
//! - Offline verification of persisted logs
//!
//! # Security Model
//!
//! Every event is:
//! - Signed over its canonical form, covering every field but the
//!   signature itself
//! - Linked to the previous event via `prevHmac`
//! - Timestamped
//!
//! The chain linking provides tamper evidence - modifying, deleting or
//! reordering historical events breaks a signature or a chain link and is
//! detectable offline with nothing but the log file and the key.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use attest_audit::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! // Create a client over an in-memory sink
//! let sink = Arc::new(MemorySink::default());
//! let client = AuditClient::builder("dev-secret", sink.clone()).build();
//!
//! // Record an action
//! client
//!     .log(
//!         EventDraft::new("createProject")
//!             .with_user(AuditUser::new("u-1"))
//!             .with_outcome(Outcome::Success),
//!     )
//!     .await
//!     .unwrap();
//!
//! // Verify the log offline
//! let lines = sink.lines();
//! let report = verify_lines(
//!     lines.iter().map(String::as_str),
//!     &SigningKey::from("dev-secret"),
//! )
//! .unwrap();
//! assert_eq!(report.outcome(), VerifyOutcome::Valid);
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod chain;
mod client;
mod context;
mod error;
mod event;
mod signature;
pub mod sink;
mod verify;
mod wrap;

pub use chain::last_hmac_from_file;
pub use client::{AuditClient, AuditClientBuilder};
pub use context::{RequestContext, current, with_child_span, with_context};
pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditUser, ErrorInfo, EventDraft, Outcome};
pub use signature::SigningKey;
pub use sink::{
    AuditSink, BackpressureMode, ErrorCallback, FileSink, MemorySink, RotatingFileSink,
    RotatingSinkOptions, SinkError, SinkResult,
};
pub use verify::{VerifyOutcome, VerifyReport, verify_file, verify_lines};
pub use wrap::{AuditedCall, AuditedFailure, EmitPolicy, Redactor, audited};

// Re-export the canonical value type; event details are expressed in it.
pub use attest_canonical::CanonicalValue;
