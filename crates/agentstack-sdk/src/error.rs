//! Error taxonomy for the SDK's tracer, transport, and exporter.
//!
//! Per the recoverability rule, none of these errors ever escape into user
//! code: the tracer's public API swallows and logs them, matching
//! `original_source/.../tracer.py`'s "span bookkeeping never raises".

use thiserror::Error;

/// Failures internal to the SDK. Never propagated past the tracer's public
/// surface; exists so internal code can use `?` and so tests can assert on
/// failure modes directly.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The transport's HTTP request failed outright (connection refused,
    /// DNS failure, TLS error).
    #[error("transport request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The transport's per-attempt timeout elapsed.
    #[error("transport request timed out")]
    Timeout,

    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] agentstack_config::ConfigError),

    /// A batch could not be serialized to JSON before sending.
    #[error("failed to serialize span batch: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The local fallback store failed to save or replay spans.
    #[error("fallback store error: {0}")]
    Fallback(#[from] agentstack_store::AnalyticalStoreError),
}

impl SdkError {
    /// Whether the failure is transient and worth retrying (network/timeout)
    /// as opposed to a permanent misconfiguration.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SdkError>;
