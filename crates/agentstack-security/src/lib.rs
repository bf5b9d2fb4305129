//! API key verification and the gateway's per-IP rate limiter.

pub mod auth;
pub mod error;
pub mod rate_limit;

pub use auth::{generate_api_key, ApiKeyRecord, AuthCache};
pub use error::{Result, SecurityError};
pub use rate_limit::RateLimiter;
