//! Error taxonomy for the consumer framework and its three workers.

use thiserror::Error;

/// Failures a worker can hit while starting up or processing an entry.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The durable log rejected an operation.
    #[error("durable log error: {0}")]
    DurableLog(#[from] agentstack_durablelog::DurableLogError),

    /// The analytical store rejected a write.
    #[error("analytical store error: {0}")]
    Store(#[from] agentstack_store::AnalyticalStoreError),

    /// A log entry's payload could not be decoded into the expected shape.
    /// Per the error-handling table, this drops the offending entry with a
    /// warning rather than poisoning the consumer group; it is acked, not
    /// retried.
    #[error("failed to decode entry payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Consumer-group creation failed for a reason other than the group
    /// already existing. Fatal: the worker must not start with a broken
    /// group.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl WorkerError {
    /// Whether the worker should keep the current batch buffered and retry
    /// on the next tick (transient store/log failure) as opposed to
    /// dropping the offending entry and moving on (a decode failure).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DurableLog(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            Self::Decode(_) | Self::Fatal(_) => false,
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, WorkerError>;
