//! The cost calculator worker: prices LLM usage off a static per-model
//! catalog and writes `cost_metrics` rows in batch.
//!
//! Grounded on `original_source/.../cost_calculator.py`'s `PRICING` dict and
//! substring-match lookup (`for key in PRICING: if key in model`), and on
//! the teacher's `gateway-telemetry/src/cost.rs` `ModelPricing`/
//! `calculate_cost` shape for the calculation method itself. Owns its own
//! loop rather than [`crate::consumer::Consumer`] for the same
//! buffer-then-batch-ack reason as [`crate::writer::PersistentWriter`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentstack_durablelog::DurableLog;
use agentstack_store::{AnalyticalStore, CostRow};
use tracing::{debug, info, instrument, warn};

use crate::error::WorkerError;

const TOPIC: &str = "spans.ingest";
const GROUP: &str = "cost";
const FLUSH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const READ_BATCH: usize = 100;
const READ_BLOCK: Duration = Duration::from_millis(500);
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// USD price per 1000 tokens, `(prompt, completion)`.
struct ModelPricing {
    key: &'static str,
    input: f64,
    output: f64,
}

/// Static pricing catalog. Lookup is "the first entry whose key is a
/// substring of the reported model name", so order matters: more specific
/// keys (`gpt-4-turbo`, `gpt-4o`) must precede the bare `gpt-4` they'd
/// otherwise be swallowed by.
const PRICING_CATALOG: &[ModelPricing] = &[
    ModelPricing { key: "gpt-4-turbo", input: 0.01, output: 0.03 },
    ModelPricing { key: "gpt-4o", input: 0.005, output: 0.015 },
    ModelPricing { key: "gpt-4", input: 0.03, output: 0.06 },
    ModelPricing { key: "gpt-3.5-turbo", input: 0.0005, output: 0.0015 },
    ModelPricing { key: "claude-3-opus", input: 0.015, output: 0.075 },
    ModelPricing { key: "claude-3-sonnet", input: 0.003, output: 0.015 },
    ModelPricing { key: "claude-3-haiku", input: 0.00025, output: 0.00125 },
];

fn lookup_pricing(model: &str) -> Option<&'static ModelPricing> {
    PRICING_CATALOG.iter().find(|p| model.contains(p.key))
}

/// Span attributes are string-keyed and string-*valued* (see
/// `agentstack_core::span::Span`), so numeric attributes arrive as decimal
/// strings in the ingested JSON and must be parsed, not read as JSON numbers.
fn attr_u64(attributes: &serde_json::Value, key: &str) -> u64 {
    attributes
        .get(key)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn attr_str<'a>(attributes: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| attributes.get(*k).and_then(serde_json::Value::as_str))
}

/// Derive a `CostRow` from a decoded span's JSON payload, or `None` if the
/// span carries no priceable LLM usage.
fn cost_row_from_payload(payload: &serde_json::Value) -> Option<CostRow> {
    let attributes = payload.get("attributes")?;
    let model = attr_str(attributes, &["llm.model", "model"])?.to_lowercase();

    let prompt_tokens = attr_u64(attributes, "llm.usage.prompt_tokens");
    let completion_tokens = attr_u64(attributes, "llm.usage.completion_tokens");
    let total_tokens = attr_u64(attributes, "llm.usage.total_tokens");
    if prompt_tokens == 0 && completion_tokens == 0 && total_tokens == 0 {
        return None;
    }

    let pricing = lookup_pricing(&model)?;
    let cost_usd = (prompt_tokens as f64 / 1000.0) * pricing.input
        + (completion_tokens as f64 / 1000.0) * pricing.output;

    Some(CostRow {
        project_id: payload.get("project_id").and_then(serde_json::Value::as_str).unwrap_or_default().to_string(),
        model,
        span_kind: payload.get("name").and_then(serde_json::Value::as_str).unwrap_or_default().to_string(),
        timestamp: payload.get("end_time").and_then(serde_json::Value::as_i64).unwrap_or_default() / 1_000_000,
        prompt_tokens: prompt_tokens as i64,
        completion_tokens: completion_tokens as i64,
        total_tokens: total_tokens as i64,
        cost_usd,
    })
}

/// Buffers priceable spans and bulk-writes `cost_metrics` rows.
pub struct CostWorker {
    consumer_id: String,
    store: Arc<dyn AnalyticalStore>,
}

impl CostWorker {
    #[must_use]
    pub fn new(consumer_id: impl Into<String>, store: Arc<dyn AnalyticalStore>) -> Self {
        Self { consumer_id: consumer_id.into(), store }
    }

    /// Run until `stop` is set, performing one final flush attempt before
    /// returning.
    ///
    /// # Errors
    /// Returns [`WorkerError::Fatal`] if the `cost` consumer group cannot be
    /// created.
    #[instrument(skip_all, fields(consumer_id = %self.consumer_id))]
    pub async fn run(
        &self,
        log: Arc<dyn DurableLog>,
        stop: Arc<AtomicBool>,
    ) -> Result<(), WorkerError> {
        log.create_group(TOPIC, GROUP)
            .await
            .map_err(|e| WorkerError::Fatal(format!("group creation failed: {e}")))?;
        info!("cost worker started");

        let mut buffer: Vec<(String, CostRow)> = Vec::new();
        let mut last_flush = Instant::now();

        loop {
            if stop.load(Ordering::Relaxed) {
                self.flush(&log, &mut buffer).await;
                break;
            }

            match log.read_group(TOPIC, GROUP, READ_BATCH, READ_BLOCK).await {
                Ok(entries) => {
                    for entry in entries {
                        match cost_row_from_payload(&entry.payload) {
                            Some(row) => buffer.push((entry.id, row)),
                            None => {
                                if let Err(error) = log.ack(TOPIC, GROUP, &entry.id).await {
                                    warn!(%error, entry_id = %entry.id, "ack failed for non-priceable span");
                                }
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "unexpected error reading spans.ingest, sleeping 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            if buffer.len() >= FLUSH_SIZE || last_flush.elapsed() >= FLUSH_INTERVAL {
                self.flush(&log, &mut buffer).await;
                last_flush = Instant::now();
            }
        }
        info!("cost worker stopped");
        Ok(())
    }

    async fn flush(&self, log: &Arc<dyn DurableLog>, buffer: &mut Vec<(String, CostRow)>) {
        if buffer.is_empty() {
            return;
        }
        let rows: Vec<CostRow> = buffer.iter().map(|(_, r)| r.clone()).collect();
        match self.store.insert_cost_rows(&rows).await {
            Ok(()) => {
                for (entry_id, _) in buffer.iter() {
                    if let Err(error) = log.ack(TOPIC, GROUP, entry_id).await {
                        warn!(%entry_id, %error, "ack failed after successful cost row insert");
                    }
                }
                debug!(count = buffer.len(), "flushed cost batch");
                buffer.clear();
            }
            Err(error) => {
                warn!(%error, count = buffer.len(), "cost row insert failed, buffer retained for retry");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentstack_durablelog::InMemoryLog;
    use agentstack_store::SqliteAnalyticalStore;
    use serde_json::json;

    fn span_payload(model: &str, prompt: u64, completion: u64) -> serde_json::Value {
        json!({
            "span_id": "s1",
            "trace_id": "t1",
            "parent_span_id": null,
            "project_id": "p1",
            "name": "llm.completion",
            "service_name": "svc",
            "status": "OK",
            "start_time": 0,
            "end_time": 1000,
            "duration_ms": 1000,
            "attributes": {
                "llm.model": model,
                "llm.usage.prompt_tokens": prompt.to_string(),
                "llm.usage.completion_tokens": completion.to_string(),
                "llm.usage.total_tokens": (prompt + completion).to_string(),
            },
            "events": [],
        })
    }

    #[test]
    fn gpt4_0613_costs_as_documented() {
        let row = cost_row_from_payload(&span_payload("gpt-4-0613", 1000, 500)).unwrap();
        assert!((row.cost_usd - 0.06).abs() < 1e-9);
        assert_eq!(row.model, "gpt-4-0613");
    }

    #[test]
    fn gpt4_turbo_is_not_swallowed_by_gpt4() {
        let row = cost_row_from_payload(&span_payload("gpt-4-turbo-preview", 1000, 1000)).unwrap();
        assert!((row.cost_usd - (0.01 + 0.03)).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_skipped() {
        assert!(cost_row_from_payload(&span_payload("llama-3-70b", 100, 50)).is_none());
    }

    #[test]
    fn zero_usage_is_skipped() {
        assert!(cost_row_from_payload(&span_payload("gpt-4o", 0, 0)).is_none());
    }

    #[test]
    fn missing_model_is_skipped() {
        let payload = json!({
            "attributes": { "llm.usage.prompt_tokens": 10 },
        });
        assert!(cost_row_from_payload(&payload).is_none());
    }

    async fn sqlite_store() -> (Arc<SqliteAnalyticalStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAnalyticalStore::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn flushes_and_acks_on_interval() {
        let (store, _dir) = sqlite_store().await;
        let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
        log.append(TOPIC, span_payload("gpt-4o", 1000, 1000)).await.unwrap();

        let worker = CostWorker::new("c1", store.clone());
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let log2 = Arc::clone(&log);
        let handle = tokio::spawn(async move { worker.run(log2, stop2).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.store(true, Ordering::Relaxed);
        handle.await.unwrap().unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cost_metrics")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
