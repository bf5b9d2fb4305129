//! The ingest gateway (`POST /v1/traces`) and the live alert broadcaster
//! (`GET /ws/traces`), wired together behind one [`axum::Router`].
//!
//! Grounded on `gateway-server/src/routes.rs`'s `create_router` shape: one
//! function building the full route table plus its middleware stack, taking
//! the already-constructed [`AppState`] rather than building it itself.

pub mod broadcaster;
pub mod error;
pub mod gateway;
pub mod projects;
pub mod state;
pub mod validate;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use broadcaster::{run_broadcast_loop, Broadcaster};
pub use state::AppState;

/// Builds the CORS layer from the gateway's allowlist. An empty allowlist
/// means closed by default (§4.6): no `Access-Control-Allow-Origin` is ever
/// sent, so cross-origin browser requests fail. Credentialed CORS is never
/// enabled regardless of the allowlist (§4.6: "Credentialed CORS is off").
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::HeaderName::from_static("x-api-key")]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(AllowOrigin::list(Vec::<HeaderValue>::new()));
    }

    let origins: Vec<HeaderValue> =
        allowed_origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Builds the full gateway + broadcaster router. The body-limit layer runs
/// before any extractor in [`gateway::ingest_traces`], which is what lets
/// that handler's step-1 size check reject an oversized body without ever
/// touching auth (§4.6's seven-step order).
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    let body_limit = state.config.max_payload_bytes;

    Router::new()
        .route("/v1/traces", post(gateway::ingest_traces))
        .route("/ws/traces", get(broadcaster::ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
