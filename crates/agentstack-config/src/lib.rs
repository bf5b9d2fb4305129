//! Environment-driven configuration for every component: the SDK's tracer
//! and exporter, and the collector's gateway, broadcaster, and workers.

pub mod collector;
pub mod env;
pub mod error;
pub mod sdk;

pub use collector::CollectorConfig;
pub use error::{ConfigError, Result};
pub use sdk::{SdkConfig, SdkConfigBuilder};
