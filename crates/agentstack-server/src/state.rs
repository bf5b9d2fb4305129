//! Shared application state threaded through every handler via axum's
//! `State` extractor, matching `gateway-server/src/state.rs`'s `AppState`
//! (a cheaply cloneable bundle of `Arc`s) conventions.

use std::sync::Arc;

use agentstack_config::CollectorConfig;
use agentstack_durablelog::DurableLog;
use agentstack_security::{AuthCache, RateLimiter};

use crate::broadcaster::Broadcaster;
use crate::projects::ProjectRegistry;

/// Ingest gateway state: configuration plus the shared, process-local
/// collaborators every request needs.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration (limits, CORS allowlist, bind address).
    pub config: Arc<CollectorConfig>,
    /// Shared durable log handle spans are appended to.
    pub log: Arc<dyn DurableLog>,
    /// Two-tier API key verification cache.
    pub auth_cache: Arc<AuthCache>,
    /// Known projects' hashed API keys, scanned on an auth-cache miss.
    pub projects: Arc<ProjectRegistry>,
    /// Per-IP request budget.
    pub rate_limiter: Arc<RateLimiter>,
    /// The live broadcaster's connection set, shared between the `/ws/traces`
    /// handler and the background `alerts.live` tail-read task.
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    /// Build gateway state from its configuration and a durable log handle.
    #[must_use]
    pub fn new(config: CollectorConfig, log: Arc<dyn DurableLog>) -> Self {
        let auth_cache = Arc::new(AuthCache::new(config.auth_cache_capacity));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            std::time::Duration::from_secs(60),
            1000,
        ));
        Self {
            config: Arc::new(config),
            log,
            auth_cache,
            projects: Arc::new(ProjectRegistry::new()),
            rate_limiter,
            broadcaster: Arc::new(Broadcaster::new()),
        }
    }
}
