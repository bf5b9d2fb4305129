//! SDK-side configuration: what the instrumented application reads to wire
//! up its tracer, exporter, and transport.

use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;

use crate::env;
use crate::error::{ConfigError, Result};

/// Configuration for the SDK's tracer, batch exporter, and HTTP transport.
#[derive(Debug, Clone, Serialize)]
pub struct SdkConfig {
    /// `X-API-Key` header value sent to the collector. Never logged or
    /// serialized in full.
    #[serde(skip_serializing)]
    pub api_key: SecretString,
    /// Base URL of the ingest gateway, e.g. `http://localhost:4318`.
    pub collector_url: String,
    /// Master switch; when `false` the SDK no-ops (spans still run user code
    /// but are never exported).
    pub enabled: bool,
    /// Spans buffered before an eager flush.
    pub batch_size: usize,
    /// Periodic flush interval.
    #[serde(with = "humantime_serde")]
    pub export_interval: Duration,
    /// Bound on the in-memory ring buffer before oldest spans are dropped.
    pub max_queue_size: usize,
    /// `tracing-subscriber` level filter for the SDK's own internal logging.
    pub log_level: String,
    /// Verbose internal debug logging, independent of `log_level`.
    pub debug: bool,
    /// Service name attached to every span originated by this process.
    pub service_name: String,
}

impl SdkConfig {
    /// Load configuration from the process environment, applying the
    /// documented defaults for anything unset.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a set variable cannot be parsed into its
    /// expected type.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api_key: SecretString::from(env::string("AGENTSTACK_API_KEY", "")),
            collector_url: env::string("AGENTSTACK_COLLECTOR_URL", "http://localhost:4318"),
            enabled: env::boolean("AGENTSTACK_ENABLED", true)?,
            batch_size: env::parse("AGENTSTACK_BATCH_SIZE", 64)?,
            export_interval: env::duration_ms("AGENTSTACK_EXPORT_INTERVAL", 5000)?,
            max_queue_size: env::parse("AGENTSTACK_MAX_QUEUE_SIZE", 2048)?,
            log_level: env::string("AGENTSTACK_LOG_LEVEL", "INFO"),
            debug: env::boolean("AGENTSTACK_DEBUG", false)?,
            service_name: env::string("AGENTSTACK_SERVICE_NAME", "default"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a builder seeded with the documented defaults.
    #[must_use]
    pub fn builder() -> SdkConfigBuilder {
        SdkConfigBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        if self.enabled && url::Url::parse(&self.collector_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "collector_url",
                message: format!("not a valid URL: {}", self.collector_url),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_queue_size < self.batch_size {
            return Err(ConfigError::Invalid {
                field: "max_queue_size",
                message: "must be at least batch_size".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            collector_url: "http://localhost:4318".to_string(),
            enabled: true,
            batch_size: 64,
            export_interval: Duration::from_millis(5000),
            max_queue_size: 2048,
            log_level: "INFO".to_string(),
            debug: false,
            service_name: "default".to_string(),
        }
    }
}

/// Builder for [`SdkConfig`], for tests and callers wiring up the SDK
/// programmatically rather than through the environment.
#[derive(Debug, Default)]
pub struct SdkConfigBuilder {
    config: SdkConfig,
}

impl SdkConfigBuilder {
    /// Set the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = SecretString::from(key.into());
        self
    }

    /// Set the collector base URL.
    #[must_use]
    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.config.collector_url = url.into();
        self
    }

    /// Enable or disable the SDK.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the export interval.
    #[must_use]
    pub fn export_interval(mut self, interval: Duration) -> Self {
        self.config.export_interval = interval;
        self
    }

    /// Set the max queue size.
    #[must_use]
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    /// Set the service name.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the assembled configuration is invalid.
    pub fn build(self) -> Result<SdkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
