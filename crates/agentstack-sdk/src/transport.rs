//! Gzip + JSON HTTP transport to the ingest gateway.
//!
//! Grounded on `original_source/.../_internal/transport.py`'s
//! `HttpTransport.send()`: serialize `{"spans": [...]}`, gzip the body, POST
//! to `<collector>/v1/traces` with `X-API-Key`/`Content-Encoding: gzip`, retry
//! on network error, timeout, or a `{429,500,502,503,504}` status with the
//! exact `1s, 2s, 4s` backoff from [`agentstack_resilience::RetryConfig::transport_default`].
//! 4xx statuses outside that set are never retried.

use std::io::Write;
use std::time::Duration;

use agentstack_core::SpanRecord;
use agentstack_resilience::{RetryConfig, RetryPolicy};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("agentstack-sdk/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The outcome of a single [`Transport::send`] call. Never an `Err` — every
/// failure mode is represented so the exporter can decide what to do next
/// without the transport panicking or propagating an error type of its own.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Whether the collector accepted the batch (2xx response).
    pub success: bool,
    /// HTTP status code of the last attempt, if a response was received.
    pub status: Option<u16>,
    /// Human-readable failure description, if unsuccessful.
    pub error: Option<String>,
    /// Number of retries performed beyond the first attempt.
    pub retries_used: u32,
}

#[derive(Serialize)]
struct BatchEnvelope<'a> {
    spans: &'a [SpanRecord],
}

/// Sends gzip-compressed JSON batches to the collector's ingest endpoint.
pub struct Transport {
    client: reqwest::Client,
    collector_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl Transport {
    /// Build a transport pointed at `collector_url` (no trailing slash
    /// required), authenticating with `api_key`.
    #[must_use]
    pub fn new(collector_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_retry(collector_url, api_key, RetryPolicy::new(RetryConfig::transport_default()))
    }

    /// Build a transport with an explicit retry policy, for tests that need
    /// a faster backoff than the literal `1s, 2s, 4s` default.
    #[must_use]
    pub fn with_retry(
        collector_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            collector_url: collector_url.into(),
            api_key: api_key.into(),
            retry,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/traces", self.collector_url.trim_end_matches('/'))
    }

    fn gzip_json(records: &[SpanRecord]) -> Result<Vec<u8>, std::io::Error> {
        let body = serde_json::to_vec(&BatchEnvelope { spans: records })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body)?;
        encoder.finish()
    }

    /// Send `records` as a single gzip+JSON batch, retrying per the
    /// configured policy. Always returns a [`SendOutcome`]; it never
    /// propagates an error to the caller, matching the spec's tuple return.
    pub async fn send(&self, records: &[SpanRecord]) -> SendOutcome {
        let payload = match Self::gzip_json(records) {
            Ok(bytes) => bytes,
            Err(error) => {
                return SendOutcome {
                    success: false,
                    status: None,
                    error: Some(format!("failed to encode batch: {error}")),
                    retries_used: 0,
                }
            }
        };

        let max_retries = self.retry.config().max_retries;
        for attempt in 0..=max_retries {
            let result = self
                .client
                .post(self.endpoint())
                .header("Content-Type", "application/json")
                .header("Content-Encoding", "gzip")
                .header("X-API-Key", &self.api_key)
                .header("User-Agent", USER_AGENT)
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        return SendOutcome {
                            success: true,
                            status: Some(status),
                            error: None,
                            retries_used: attempt,
                        };
                    }
                    let retryable = self.retry.is_retryable_status(status);
                    if !retryable || attempt == max_retries {
                        return SendOutcome {
                            success: false,
                            status: Some(status),
                            error: Some(format!("collector responded with status {status}")),
                            retries_used: attempt,
                        };
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(status, attempt, delay_ms = delay.as_millis(), "retrying span export after retryable status");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    let is_timeout = error.is_timeout();
                    if attempt == max_retries {
                        return SendOutcome {
                            success: false,
                            status: None,
                            error: Some(error.to_string()),
                            retries_used: attempt,
                        };
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(attempt, timeout = is_timeout, delay_ms = delay.as_millis(), error = %error, "retrying span export after transport error");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        debug!("transport retry loop exhausted without returning; defensive fallback outcome");
        SendOutcome {
            success: false,
            status: None,
            error: Some("retries exhausted".to_string()),
            retries_used: max_retries,
        }
    }
}
