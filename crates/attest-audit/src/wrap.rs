//! Auditing wrapper for business operations.
//!
//! [`audited`] runs an async operation inside a child span of the ambient
//! [`RequestContext`](crate::context::RequestContext) and emits one audit
//! event describing the call: its arguments, its result or error, and its
//! trace coordinates. Success events carry `outcome: success`; failures
//! carry `outcome: error` plus the captured error.

use std::sync::Arc;

use attest_canonical::CanonicalValue;
use serde::Serialize;
use thiserror::Error;

use crate::client::AuditClient;
use crate::context::{current, with_child_span};
use crate::error::AuditError;
use crate::event::{ErrorInfo, EventDraft, Outcome};

/// When the wrapper emits an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    /// Emit on success and on failure.
    #[default]
    Always,
    /// Emit only when the operation succeeds.
    Success,
    /// Emit only when the operation fails.
    Error,
}

/// Transform applied to a captured value (arguments or result) before it
/// is signed, used to strip secrets or oversized payloads from the audit
/// trail.
pub type Redactor = Arc<dyn Fn(CanonicalValue) -> CanonicalValue + Send + Sync>;

/// Description of one audited call.
pub struct AuditedCall {
    action: String,
    entity: Option<String>,
    on: EmitPolicy,
    args: Option<CanonicalValue>,
    redact_args: Option<Redactor>,
    redact_result: Option<Redactor>,
    extra: Vec<(String, CanonicalValue)>,
}

impl AuditedCall {
    /// Describe a call performing the given business action.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity: None,
            on: EmitPolicy::default(),
            args: None,
            redact_args: None,
            redact_result: None,
            extra: Vec::new(),
        }
    }

    /// Name the business entity the call concerns.
    #[must_use]
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Restrict when the event is emitted.
    #[must_use]
    pub fn on(mut self, policy: EmitPolicy) -> Self {
        self.on = policy;
        self
    }

    /// Record the call arguments in the event details.
    #[must_use]
    pub fn args(mut self, args: impl Into<CanonicalValue>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Redact the declared arguments before signing. Without a redactor
    /// the arguments are recorded as passed to [`args`](Self::args).
    #[must_use]
    pub fn redact_args(
        mut self,
        redact: impl Fn(CanonicalValue) -> CanonicalValue + Send + Sync + 'static,
    ) -> Self {
        self.redact_args = Some(Arc::new(redact));
        self
    }

    /// Redact the captured result before signing. Without a redactor the
    /// result is recorded as returned.
    #[must_use]
    pub fn redact_result(
        mut self,
        redact: impl Fn(CanonicalValue) -> CanonicalValue + Send + Sync + 'static,
    ) -> Self {
        self.redact_result = Some(Arc::new(redact));
        self
    }

    /// Attach an extra detail entry.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<CanonicalValue>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }
}

impl std::fmt::Debug for AuditedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditedCall")
            .field("action", &self.action)
            .field("entity", &self.entity)
            .field("on", &self.on)
            .finish_non_exhaustive()
    }
}

/// Failure of an audited call: either the operation itself failed, or it
/// succeeded but its audit event could not be emitted.
///
/// A success whose event cannot be written is surfaced as [`Audit`] so the
/// caller can treat an unauditable success as a failure. Emission failures
/// on the error path never mask the operation error.
///
/// [`Audit`]: AuditedFailure::Audit
#[derive(Debug, Error)]
pub enum AuditedFailure<E: std::error::Error> {
    /// The wrapped operation failed.
    #[error(transparent)]
    Operation(E),
    /// The operation succeeded but its audit event was not emitted.
    #[error("audit emission failed: {0}")]
    Audit(#[from] AuditError),
}

/// Run `op` inside a child span and emit one audit event for the call.
///
/// The event's user and `requestId` come from the ambient context; the
/// `details` carry the declared arguments, the (optionally redacted)
/// result, any extra entries, and the span's trace coordinates.
///
/// # Errors
///
/// Returns [`AuditedFailure::Operation`] when `op` fails, and
/// [`AuditedFailure::Audit`] when `op` succeeds but the event cannot be
/// emitted.
pub async fn audited<T, E, F, Fut>(
    client: &AuditClient,
    call: AuditedCall,
    op: F,
) -> Result<T, AuditedFailure<E>>
where
    T: Serialize,
    E: std::error::Error,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_child_span(async move {
        let ctx = current();
        let outcome = op().await;

        let mut draft = EventDraft::new(call.action.clone());
        if let Some(entity) = &call.entity {
            draft = draft.with_entity(entity.clone());
        }
        if let Some(ctx) = &ctx {
            draft = draft.with_request_id(ctx.trace_id.clone());
            if let Some(user) = &ctx.user {
                draft = draft.with_user(user.clone());
            }
        }

        let mut details: Vec<(String, CanonicalValue)> = Vec::new();
        if let Some(args) = &call.args {
            let mut captured = args.clone();
            if let Some(redact) = &call.redact_args {
                captured = redact(captured);
            }
            details.push(("args".to_string(), captured));
        }

        match outcome {
            Ok(value) => {
                if call.on == EmitPolicy::Error {
                    return Ok(value);
                }

                let mut captured = capture_result(&value);
                if let Some(redact) = &call.redact_result {
                    captured = redact(captured);
                }
                details.push(("result".to_string(), captured));
                details.extend(call.extra.iter().cloned());
                if let Some(ctx) = &ctx {
                    details.push(("trace".to_string(), trace_entry(ctx)));
                }

                draft = draft
                    .with_outcome(Outcome::Success)
                    .with_details(CanonicalValue::Mapping(details));
                client.log(draft).await?;
                Ok(value)
            },
            Err(err) => {
                if call.on != EmitPolicy::Success {
                    details.extend(call.extra.iter().cloned());
                    if let Some(ctx) = &ctx {
                        details.push(("trace".to_string(), trace_entry(ctx)));
                    }

                    draft = draft
                        .with_outcome(Outcome::Error)
                        .with_error(ErrorInfo::from_error(&err))
                        .with_details(CanonicalValue::Mapping(details));
                    // The operation error is what the caller must see; a
                    // failed emission on this path is logged, not raised.
                    if let Err(audit_err) = client.log(draft).await {
                        tracing::debug!("audit emission failed on error path: {audit_err}");
                    }
                }
                Err(AuditedFailure::Operation(err))
            },
        }
    })
    .await
}

fn capture_result<T: Serialize>(value: &T) -> CanonicalValue {
    match serde_json::to_value(value) {
        Ok(json) => CanonicalValue::from(json),
        Err(_) => CanonicalValue::unserializable(std::any::type_name::<T>()),
    }
}

fn trace_entry(ctx: &crate::context::RequestContext) -> CanonicalValue {
    let mut fields = vec![("traceId".to_string(), CanonicalValue::from(ctx.trace_id.clone()))];
    if let Some(span_id) = &ctx.span_id {
        fields.push(("spanId".to_string(), CanonicalValue::from(span_id.clone())));
    }
    if let Some(parent) = &ctx.parent_span_id {
        fields.push(("parentSpanId".to_string(), CanonicalValue::from(parent.clone())));
    }
    CanonicalValue::Mapping(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestContext, with_context};
    use crate::event::AuditUser;
    use crate::sink::MemorySink;

    #[derive(Debug, Error)]
    #[error("nope: {0}")]
    struct OpError(String);

    fn client_with_sink() -> (AuditClient, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let client = AuditClient::builder("test-secret", sink.clone()).build();
        (client, sink)
    }

    #[tokio::test]
    async fn success_emits_event_with_result_and_trace() {
        let (client, sink) = client_with_sink();

        let ctx = RequestContext::with_trace_id("t-1").user(AuditUser::new("u-1"));
        let value = with_context(ctx, async {
            audited(
                &client,
                AuditedCall::new("createProject").entity("Project").args(7i64),
                || async { Ok::<_, OpError>(42i64) },
            )
            .await
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let event: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event["action"], "createProject");
        assert_eq!(event["outcome"], "success");
        assert_eq!(event["user"]["id"], "u-1");
        assert_eq!(event["requestId"], "t-1");
        assert_eq!(event["details"]["args"], 7);
        assert_eq!(event["details"]["result"], 42);
        assert_eq!(event["details"]["trace"]["traceId"], "t-1");
        assert!(event["details"]["trace"]["spanId"].is_string());
    }

    #[tokio::test]
    async fn failure_emits_error_event_and_returns_the_operation_error() {
        let (client, sink) = client_with_sink();

        let result = audited(
            &client,
            AuditedCall::new("deleteProject"),
            || async { Err::<i64, _>(OpError("denied".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(AuditedFailure::Operation(_))));
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        let event: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event["outcome"], "error");
        assert_eq!(event["error"]["name"], "OpError");
        assert_eq!(event["error"]["message"], "nope: denied");
        // No result is captured for failures.
        assert!(event["details"].get("result").is_none());
    }

    #[tokio::test]
    async fn emit_policy_filters_events() {
        let (client, sink) = client_with_sink();

        audited(
            &client,
            AuditedCall::new("read").on(EmitPolicy::Error),
            || async { Ok::<_, OpError>(1i64) },
        )
        .await
        .unwrap();
        assert!(sink.lines().is_empty());

        let _ = audited(
            &client,
            AuditedCall::new("read").on(EmitPolicy::Success),
            || async { Err::<i64, _>(OpError("x".to_string())) },
        )
        .await;
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn redactor_rewrites_the_captured_result() {
        let (client, sink) = client_with_sink();

        audited(
            &client,
            AuditedCall::new("issueToken").redact_result(|_| CanonicalValue::from("[redacted]")),
            || async { Ok::<_, OpError>("super-secret-token".to_string()) },
        )
        .await
        .unwrap();

        let lines = sink.lines();
        let event: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event["details"]["result"], "[redacted]");
        assert!(!lines[0].contains("super-secret-token"));
    }

    #[tokio::test]
    async fn args_redactor_rewrites_the_declared_arguments() {
        let (client, sink) = client_with_sink();

        let args = CanonicalValue::Mapping(vec![
            ("user".to_string(), CanonicalValue::from("u-1")),
            ("password".to_string(), CanonicalValue::from("hunter2")),
        ]);
        let _ = audited(
            &client,
            AuditedCall::new("login").args(args).redact_args(|args| {
                let CanonicalValue::Mapping(entries) = args else {
                    return args;
                };
                CanonicalValue::Mapping(
                    entries
                        .into_iter()
                        .map(|(k, v)| {
                            if k == "password" {
                                (k, CanonicalValue::from("[redacted]"))
                            } else {
                                (k, v)
                            }
                        })
                        .collect(),
                )
            }),
            || async { Err::<i64, _>(OpError("bad credentials".to_string())) },
        )
        .await;

        let lines = sink.lines();
        let event: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event["details"]["args"]["user"], "u-1");
        assert_eq!(event["details"]["args"]["password"], "[redacted]");
        assert!(!lines[0].contains("hunter2"));
    }

    #[tokio::test]
    async fn extra_details_land_in_the_event() {
        let (client, sink) = client_with_sink();

        audited(
            &client,
            AuditedCall::new("export").detail("format", "csv"),
            || async { Ok::<_, OpError>(0i64) },
        )
        .await
        .unwrap();

        let event: serde_json::Value = serde_json::from_str(&sink.lines()[0]).unwrap();
        assert_eq!(event["details"]["format"], "csv");
    }
}
