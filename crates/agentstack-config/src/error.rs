//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed into
    /// the expected type.
    #[error("invalid value for {var}: {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        var: &'static str,
        /// What went wrong.
        message: String,
    },

    /// A required value was missing or empty.
    #[error("missing required value: {0}")]
    Missing(&'static str),

    /// The value failed a structural validation rule (e.g. bad URL).
    #[error("validation failed for {field}: {message}")]
    Invalid {
        /// The field that failed validation.
        field: &'static str,
        /// Why it failed.
        message: String,
    },
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ConfigError>;
