//! Collector-side configuration: the ingest gateway, live broadcaster, and
//! the workers that read off the durable log.

use crate::env;
use crate::error::Result;

/// Configuration for the ingest gateway and live broadcaster.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Address the HTTP gateway and WebSocket broadcaster bind to.
    pub bind_addr: String,
    /// Durable log connection string. Unused by the in-memory reference
    /// adapter; reserved for a future external-log adapter.
    pub log_url: String,
    /// Analytical store connection string (SQLite file path for the
    /// reference adapter).
    pub store_url: String,
    /// Local fallback store SQLite file path, used by the SDK's exporter
    /// when the collector is unreachable.
    pub fallback_db_path: String,
    /// CORS origin allowlist. Empty means no cross-origin requests are
    /// permitted — closed by default.
    pub allowed_origins: Vec<String>,
    /// Hard cap on a single ingest request body, in bytes.
    pub max_payload_bytes: usize,
    /// Hard cap on spans within a single ingest batch.
    pub max_spans_per_batch: usize,
    /// Per-IP request budget for the rate limiter.
    pub rate_limit_per_minute: u32,
    /// Bound on the two-tier auth cache's verified-key entry count.
    pub auth_cache_capacity: usize,
    /// WebSocket idle timeout before a keepalive ping is sent.
    pub ws_idle_timeout_secs: u64,
    /// Max WebSocket frame size before the connection is closed.
    pub ws_max_frame_bytes: usize,
}

impl CollectorConfig {
    /// Load configuration from the process environment, applying the
    /// documented defaults for anything unset.
    ///
    /// # Errors
    /// Returns [`ConfigError`](crate::error::ConfigError) if a set variable
    /// cannot be parsed into its expected type.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: env::string("AGENTSTACK_BIND_ADDR", "0.0.0.0:8080"),
            log_url: env::string("AGENTSTACK_LOG_URL", ""),
            store_url: env::string("AGENTSTACK_STORE_URL", "agentstack_store.db"),
            fallback_db_path: env::string("AGENTSTACK_FALLBACK_DB_PATH", ".agentstack.db"),
            allowed_origins: env::csv_list("AGENTSTACK_ALLOWED_ORIGINS"),
            max_payload_bytes: 5 * 1024 * 1024,
            max_spans_per_batch: 1000,
            rate_limit_per_minute: 100,
            auth_cache_capacity: 1000,
            ws_idle_timeout_secs: 30,
            ws_max_frame_bytes: 4096,
        })
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            log_url: String::new(),
            store_url: "agentstack_store.db".to_string(),
            fallback_db_path: ".agentstack.db".to_string(),
            allowed_origins: Vec::new(),
            max_payload_bytes: 5 * 1024 * 1024,
            max_spans_per_batch: 1000,
            rate_limit_per_minute: 100,
            auth_cache_capacity: 1000,
            ws_idle_timeout_secs: 30,
            ws_max_frame_bytes: 4096,
        }
    }
}
