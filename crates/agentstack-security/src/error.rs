//! Errors surfaced by key hashing, verification, and rate limiting.

use thiserror::Error;

/// Errors from the auth cache and rate limiter.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The presented key did not have the `ak_` prefix.
    #[error("invalid API key format")]
    InvalidKeyFormat,

    /// The presented key did not match any known project's hash.
    #[error("invalid API key")]
    InvalidKey,

    /// Argon2 hashing or verification failed for a reason other than
    /// "does not match" (malformed stored hash, bad parameters).
    #[error("key hashing failed: {0}")]
    HashingFailed(String),

    /// The caller has exceeded its request budget for the current window.
    #[error("rate limit exceeded")]
    RateLimited,
}

impl SecurityError {
    /// The HTTP status code this error should be reported as at the gateway
    /// boundary.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidKeyFormat | Self::InvalidKey => 401,
            Self::RateLimited => 429,
            Self::HashingFailed(_) => 500,
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, SecurityError>;
