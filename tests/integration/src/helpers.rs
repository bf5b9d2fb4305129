//! Shared harness for the end-to-end tests: a wired [`AppState`] with one
//! registered project, backed by an in-memory durable log.

use std::sync::Arc;

use agentstack_config::CollectorConfig;
use agentstack_durablelog::{DurableLog, InMemoryLog};
use agentstack_security::auth::{generate_api_key, ApiKeyRecord};
use agentstack_server::AppState;
use secrecy::SecretString;

/// A gateway wired with one project, ready to accept ingest requests.
pub struct Harness {
    pub state: AppState,
    pub log: Arc<dyn DurableLog>,
    pub api_key: SecretString,
    pub project_id: String,
}

/// Build a harness against a fresh in-memory log, registering one project
/// under a freshly minted API key.
pub fn build_harness() -> Harness {
    build_harness_with_config(CollectorConfig::default())
}

/// Same as [`build_harness`], but with caller-supplied config (e.g. a
/// smaller `max_payload_bytes` for the oversize-rejection scenario).
pub fn build_harness_with_config(config: CollectorConfig) -> Harness {
    let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
    let state = AppState::new(config, Arc::clone(&log));

    let project_id = "proj-e2e".to_string();
    let api_key = generate_api_key();
    let hash = state.auth_cache.hash_key(&api_key).expect("hashing a freshly generated key never fails");
    state.projects.register(ApiKeyRecord { project_id: project_id.clone(), api_key_hash: hash });

    Harness { state, log, api_key, project_id }
}
