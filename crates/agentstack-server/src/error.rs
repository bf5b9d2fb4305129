//! The ingest gateway's HTTP-facing error type.
//!
//! Grounded on `gateway-server/src/error.rs`'s `ApiError` shape (a status
//! code paired with a JSON body), generalized to the four outcomes the
//! ingest endpoint documents: `400`, `401`, `413`, `429`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure modes surfaced by the ingest gateway's HTTP handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body exceeded the configured hard cap.
    #[error("payload too large")]
    PayloadTooLarge,

    /// No usable API key was presented, or it did not verify.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The body could not be decoded into the expected span envelope shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// The caller's IP has exceeded its request budget for the window.
    #[error("rate limited")]
    RateLimited,
}

impl ApiError {
    /// The HTTP status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody { error: self.to_string() };
        (status, Json(body)).into_response()
    }
}
