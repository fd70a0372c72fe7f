//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attest_audit::prelude::*;` to import all essential types.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use attest_audit::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let sink = Arc::new(MemorySink::default());
//! let client = AuditClient::builder("dev-secret", sink).build();
//!
//! client
//!     .log(EventDraft::new("login").with_user(AuditUser::new("u-1")))
//!     .await
//!     .unwrap();
//! # });
//! ```

// Errors
pub use crate::{AuditError, AuditResult};

// Event types
pub use crate::{AuditEvent, AuditUser, CanonicalValue, ErrorInfo, EventDraft, Outcome};

// Client and signing
pub use crate::{AuditClient, AuditClientBuilder, SigningKey};

// Context and wrapping
pub use crate::{
    AuditedCall, AuditedFailure, EmitPolicy, RequestContext, audited, with_child_span, with_context,
};

// Sinks
pub use crate::{
    AuditSink, BackpressureMode, FileSink, MemorySink, RotatingFileSink, RotatingSinkOptions,
    SinkError, SinkResult,
};

// Verification
pub use crate::{VerifyOutcome, VerifyReport, last_hmac_from_file, verify_file, verify_lines};
