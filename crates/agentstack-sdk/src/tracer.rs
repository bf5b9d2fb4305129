//! The tracer: the SDK's span factory, wired to the context stack and the
//! export queue.
//!
//! Grounded on `original_source/.../tracer.py`'s `Tracer.start_span`/
//! `end_span`: span creation consults the current context to decide
//! root-vs-child, and `end_span` is where PII scrubbing and ring-buffer
//! handoff happen — both already implemented in `agentstack-core`'s
//! `Span::to_record`, so this module is a thin, fallible-free wrapper that
//! never lets a bookkeeping failure reach the caller (§7 recoverability
//! rule).

use std::future::Future;
use std::sync::Arc;

use agentstack_core::{context, Span};
use tracing::warn;

use crate::queue::ExportQueue;

/// Creates spans against the ambient context and hands completed ones to an
/// [`ExportQueue`] for the background exporter to pick up.
pub struct Tracer {
    service_name: String,
    queue: Arc<ExportQueue>,
}

impl Tracer {
    /// Build a tracer that tags every span with `service_name` and feeds
    /// completed spans into `queue`.
    #[must_use]
    pub fn new(service_name: impl Into<String>, queue: Arc<ExportQueue>) -> Self {
        Self {
            service_name: service_name.into(),
            queue,
        }
    }

    /// Start a new span. Consults the async task-local context first, then
    /// the synchronous thread-local one, so both call-site styles compose:
    /// a root if neither has a current span, a child otherwise.
    #[must_use]
    pub fn start_span(&self, name: impl Into<String>) -> Span {
        let parent = context::current().or_else(context::current_sync);
        Span::start_from_ref(name, self.service_name.clone(), parent.as_ref())
    }

    /// End `span` and hand its record to the export queue. A span that
    /// somehow has no record (already ended with no mutation path reaching
    /// `end()`) is dropped with a warning rather than panicking — exporting
    /// observability must never be the reason the host application crashes.
    pub fn end_span(&self, mut span: Span) {
        span.end();
        match span.to_record() {
            Some(record) => self.queue.push(record),
            None => warn!("end_span called but span produced no record"),
        }
    }

    /// Run `f` with a span named `name` current for its duration (the
    /// synchronous call-site wrapper named in the design notes). The span
    /// is always ended, and any `Err` return records an exception on the
    /// span before it ends — user code's return value always propagates
    /// unchanged.
    pub fn traced<F, T, E>(&self, name: impl Into<String>, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut span = self.start_span(name);
        let _guard = context::enter(span.as_ref_handle());
        let result = f();
        if let Err(error) = &result {
            span.record_exception("Error", &error.to_string());
        }
        drop(_guard);
        self.end_span(span);
        result
    }

    /// Async counterpart of [`Tracer::traced`], keeping the span current for
    /// the whole awaited future via [`context::with_span`].
    pub async fn traced_async<F, Fut, T, E>(&self, name: impl Into<String>, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut span = self.start_span(name);
        let span_ref = span.as_ref_handle();
        let result = context::with_span(span_ref, f()).await;
        if let Err(error) = &result {
            span.record_exception("Error", &error.to_string());
        }
        self.end_span(span);
        result
    }
}
