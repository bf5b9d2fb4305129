//! `POST /v1/traces`: the ingest gateway's single handler.
//!
//! Grounded step-by-step on `original_source/.../server.py`'s handler, and
//! on `gateway-server/src/handlers.rs`'s extractor/`#[instrument]` style.
//! The seven-step order is load-bearing: body-cap rejection must happen
//! without ever touching the auth path (enforced here by applying
//! [`axum::extract::DefaultBodyLimit`] as a router layer, which runs before
//! any extractor in this handler does).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validate::{inject_project_id, validate_and_normalize};

const TOPIC: &str = "spans.ingest";

/// `202` response body.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Always `true`; the handler never partially fails the whole request.
    pub accepted: bool,
    /// Number of spans actually appended to the log (invalid spans in the
    /// same batch are dropped and not counted).
    pub queued_count: usize,
    /// The authenticated project these spans were attributed to.
    pub project_id: String,
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers.get("x-api-key")?.to_str().ok().map(ToString::to_string)
}

/// Normalize the decoded top-level JSON value into a list of span values:
/// `{"spans": [...]}`, a bare array, or a single span object.
fn normalize_envelope(value: Value) -> Result<Vec<Value>, ApiError> {
    match value {
        Value::Object(mut object) => {
            if let Some(spans) = object.remove("spans") {
                match spans {
                    Value::Array(items) => Ok(items),
                    _ => Err(ApiError::Malformed("`spans` must be an array".to_string())),
                }
            } else {
                Ok(vec![Value::Object(object)])
            }
        }
        Value::Array(items) => Ok(items),
        _ => Err(ApiError::Malformed("body must be an object or array".to_string())),
    }
}

/// `POST /v1/traces`.
///
/// Takes the raw [`Request`] rather than separate extractors so the body-cap
/// check (step 1) can run against the unbuffered body before anything else,
/// including auth, touches it.
#[instrument(skip(state, request))]
pub async fn ingest_traces(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Result<(axum::http::StatusCode, Json<IngestResponse>), ApiError> {
    let (parts, body) = request.into_parts();
    let headers: &HeaderMap = &parts.headers;

    // `to_bytes` surfaces both "exceeded the limit" and "stream read error"
    // as the same `axum::Error`; the former is overwhelmingly the common
    // case in practice, so both map to `PayloadTooLarge`.
    let body_bytes = axum::body::to_bytes(body, state.config.max_payload_bytes)
        .await
        .map_err(|_| ApiError::PayloadTooLarge)?;

    if let Some(ConnectInfo(addr)) = connect_info {
        if state.rate_limiter.check(addr.ip()).is_err() {
            return Err(ApiError::RateLimited);
        }
    }

    let api_key =
        extract_api_key(headers).ok_or_else(|| ApiError::Unauthorized("missing X-API-Key".to_string()))?;
    let project_id = state
        .auth_cache
        .verify(&api_key, &state.projects.snapshot())
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let value: Value =
        serde_json::from_slice(&body_bytes).map_err(|e| ApiError::Malformed(e.to_string()))?;
    let spans = normalize_envelope(value)?;

    if spans.is_empty() || spans.len() > state.config.max_spans_per_batch {
        return Err(ApiError::Malformed(format!(
            "batch of {} spans outside the accepted 1..={} range",
            spans.len(),
            state.config.max_spans_per_batch
        )));
    }

    let mut queued_count = 0usize;
    for mut span in spans {
        if let Err(reason) = validate_and_normalize(&mut span) {
            warn!(reason = %reason.0, "dropping invalid span");
            continue;
        }
        inject_project_id(&mut span, &project_id);

        if let Err(error) = state.log.append(TOPIC, span).await {
            warn!(%error, "failed to append span to durable log");
            continue;
        }
        queued_count += 1;
    }

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(IngestResponse { accepted: true, queued_count, project_id }),
    ))
}
