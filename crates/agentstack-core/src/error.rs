//! Error taxonomy for span and context operations.

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures that can occur while building or serializing a span.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The span was already ended; the requested mutation was ignored.
    #[error("span {span_id} already ended, mutation ignored")]
    AlreadyEnded {
        /// The id of the span that rejected the mutation.
        span_id: String,
    },

    /// Serialization to a `SpanRecord` failed.
    #[error("failed to serialize span: {message}")]
    Serialization {
        /// Human-readable cause.
        message: String,
    },
}
