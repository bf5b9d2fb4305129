//! Span, context, and clock primitives shared across the SDK, the ingest
//! gateway, and the consumer workers.

pub mod clock;
pub mod context;
pub mod error;
pub mod ids;
pub mod redactor;
pub mod span;

pub use context::{current, enter, snapshot, with_snapshot, with_span, SpanRef, SyncGuard};
pub use error::{CoreError, Result};
pub use redactor::scrub;
pub use span::{Span, SpanEvent, SpanRecord, SpanStatus};
