//! Errors from the durable log abstraction.

use thiserror::Error;

/// Errors raised by a [`crate::DurableLog`] implementation.
#[derive(Debug, Error)]
pub enum DurableLogError {
    /// Creating a consumer group failed for a reason other than the group
    /// already existing (which is treated as success, not an error — the
    /// consumer loop fails fast on any other error per the worker's
    /// `BUSYGROUP`-tolerant startup).
    #[error("failed to create consumer group {group} on {topic}: {message}")]
    GroupCreateFailed {
        /// Topic the group was being created on.
        topic: String,
        /// Group name.
        group: String,
        /// Underlying failure.
        message: String,
    },

    /// The referenced topic or group does not exist.
    #[error("unknown topic or group: {0}")]
    NotFound(String),

    /// An entry id referenced by `ack` was not found in the group's pending
    /// set.
    #[error("unknown entry id: {0}")]
    UnknownEntry(String),
}

impl DurableLogError {
    /// Whether retrying the operation that produced this error might
    /// succeed. Group-create failures are not retryable by construction
    /// (the in-memory adapter cannot produce a transient one); lookups that
    /// fail on a missing id/topic are also not retryable without a caller
    /// correcting the input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, DurableLogError>;
