//! Small environment-variable reading helpers shared by the config structs.
//!
//! Each helper falls back to a caller-supplied default when the variable is
//! unset, and returns [`ConfigError::InvalidEnvVar`] when it is set but
//! cannot be parsed — an unset variable is never an error, a malformed one
//! always is.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub fn string(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

pub fn parse<T>(var: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            var,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

pub fn boolean(var: &'static str, default: bool) -> Result<bool> {
    match std::env::var(var) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar {
                var,
                message: format!("not a boolean: {other}"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Read a millisecond integer env var into a [`Duration`].
pub fn duration_ms(var: &'static str, default_ms: u64) -> Result<Duration> {
    parse::<u64>(var, default_ms).map(Duration::from_millis)
}

/// Comma-separated list, trimmed, empty entries dropped. Returns an empty
/// `Vec` (not an error) when unset.
pub fn csv_list(var: &'static str) -> Vec<String> {
    std::env::var(var)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
