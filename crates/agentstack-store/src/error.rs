//! Errors from the fallback store and the analytical store adapter.

use thiserror::Error;

/// Errors raised by [`crate::fallback::FallbackStore`] or
/// [`crate::analytical::AnalyticalStore`] implementations.
#[derive(Debug, Error)]
pub enum AnalyticalStoreError {
    /// The underlying database returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row's JSON payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticalStoreError {
    /// Database errors are generally transient (disk contention, lock
    /// timeout); serialization errors are a caller bug and never transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, AnalyticalStoreError>;
