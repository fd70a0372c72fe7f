//! Ambient request context for audit correlation.
//!
//! Correlation identifiers (trace, span, user) are carried in a task-local
//! scope so nested audited calls see them without explicit threading
//! through every signature. Entering a scope pushes a context; leaving it
//! restores the previous one.

use std::future::Future;

use crate::event::AuditUser;

/// Correlation identifiers visible to audited calls within a scope.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id spanning one logical request.
    pub trace_id: String,
    /// Identifier of the current unit of work, when inside one.
    pub span_id: Option<String>,
    /// Span that spawned the current one.
    pub parent_span_id: Option<String>,
    /// User on whose behalf this request runs.
    pub user: Option<AuditUser>,
}

impl RequestContext {
    /// A fresh root context with a generated trace id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: new_id(),
            span_id: None,
            parent_span_id: None,
            user: None,
        }
    }

    /// A root context with an externally supplied trace id.
    #[must_use]
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: None,
            parent_span_id: None,
            user: None,
        }
    }

    /// Attribute the scope to a user.
    #[must_use]
    pub fn user(mut self, user: AuditUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Derive a child-span context: same trace and user, fresh span id,
    /// parent set to the current span.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Some(new_id()),
            parent_span_id: self.span_id.clone(),
            user: self.user.clone(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Run a future inside the given context scope.
pub async fn with_context<F: Future>(ctx: RequestContext, f: F) -> F::Output {
    CURRENT.scope(ctx, f).await
}

/// The context of the current scope, if any.
#[must_use]
pub fn current() -> Option<RequestContext> {
    CURRENT.try_with(Clone::clone).ok()
}

/// Run a future inside a child span of the current context.
///
/// With no surrounding context this starts a fresh trace, so audited calls
/// are always correlatable.
pub async fn with_child_span<F: Future>(f: F) -> F::Output {
    let child = current().map_or_else(|| RequestContext::new().child(), |ctx| ctx.child());
    with_context(child, f).await
}
