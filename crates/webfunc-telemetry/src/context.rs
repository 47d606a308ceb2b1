//! Per-request correlation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifies one inbound request across the logs it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// When the request arrived.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Start a context for `method` and `path`.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            started_at: Utc::now(),
        }
    }

    /// Time since the request arrived, in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// First eight characters of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        let mut id = self.request_id.simple().to_string();
        id.truncate(8);
        id
    }

    /// A span carrying the request id, method and path.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.short_id(),
            method = %self.method,
            path = %self.path,
        )
    }
}

/// Enters the request span and logs completion when dropped.
pub struct RequestGuard {
    context: RequestContext,
    status: Option<u16>,
    _span: tracing::span::EnteredSpan,
}

impl RequestGuard {
    /// Enter `context`'s span.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("Request started");
        Self {
            context,
            status: None,
            _span: span,
        }
    }

    /// The request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Record the response status for the completion log.
    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }
}

impl std::fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGuard")
            .field("context", &self.context)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        tracing::info!(
            status = self.status,
            elapsed_ms = self.context.elapsed_ms(),
            "Request completed"
        );
    }
}
