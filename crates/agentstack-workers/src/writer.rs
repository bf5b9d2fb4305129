//! The persistent writer worker: buffers decoded spans and bulk-writes them
//! to the analytical store, acking only after a successful write.
//!
//! Grounded on `original_source/.../clickhouse_writer.py`: unlike the base
//! consumer loop, this worker only acks once the store write for the whole
//! buffered batch has succeeded — "acks all buffered entry ids in one
//! pipelined operation" — so it owns its own loop rather than using
//! [`crate::consumer::Consumer`]'s ack-immediately-per-entry contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentstack_core::SpanRecord;
use agentstack_durablelog::DurableLog;
use agentstack_store::AnalyticalStore;
use tracing::{debug, info, instrument, warn};

use crate::error::WorkerError;

const TOPIC: &str = "spans.ingest";
const GROUP: &str = "writer";
const DEFAULT_FLUSH_SIZE: usize = 1000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const READ_BATCH: usize = 200;
const READ_BLOCK: Duration = Duration::from_millis(500);
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Buffers span records decoded off `spans.ingest` and flushes them to the
/// analytical store in bulk.
pub struct PersistentWriter {
    consumer_id: String,
    store: Arc<dyn AnalyticalStore>,
    flush_size: usize,
    flush_interval: Duration,
}

impl PersistentWriter {
    /// Build a writer with the documented defaults (flush at 1000 buffered
    /// spans or 1s elapsed, whichever first).
    #[must_use]
    pub fn new(consumer_id: impl Into<String>, store: Arc<dyn AnalyticalStore>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            store,
            flush_size: DEFAULT_FLUSH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Run until `stop` is set, performing one final flush attempt before
    /// returning.
    ///
    /// # Errors
    /// Returns [`WorkerError::Fatal`] if the `writer` consumer group cannot
    /// be created.
    #[instrument(skip_all, fields(consumer_id = %self.consumer_id))]
    pub async fn run(
        &self,
        log: Arc<dyn DurableLog>,
        stop: Arc<AtomicBool>,
    ) -> Result<(), WorkerError> {
        log.create_group(TOPIC, GROUP)
            .await
            .map_err(|e| WorkerError::Fatal(format!("group creation failed: {e}")))?;
        info!("persistent writer started");

        let mut buffer: Vec<(String, SpanRecord)> = Vec::new();
        let mut last_flush = Instant::now();

        loop {
            if stop.load(Ordering::Relaxed) {
                self.flush(&log, &mut buffer).await;
                break;
            }

            match log.read_group(TOPIC, GROUP, READ_BATCH, READ_BLOCK).await {
                Ok(entries) => {
                    for entry in entries {
                        match serde_json::from_value::<SpanRecord>(entry.payload) {
                            Ok(record) => buffer.push((entry.id, record)),
                            Err(error) => {
                                warn!(entry_id = %entry.id, %error, "dropping span with invalid schema");
                                if let Err(ack_err) = log.ack(TOPIC, GROUP, &entry.id).await {
                                    warn!(%ack_err, "failed to ack dropped entry");
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

            if buffer.len() >= self.flush_size || last_flush.elapsed() >= self.flush_interval {
                self.flush(&log, &mut buffer).await;
                last_flush = Instant::now();
            }
        }
        info!("persistent writer stopped");
        Ok(())
    }

    async fn flush(&self, log: &Arc<dyn DurableLog>, buffer: &mut Vec<(String, SpanRecord)>) {
        if buffer.is_empty() {
            return;
        }
        let records: Vec<SpanRecord> = buffer.iter().map(|(_, r)| r.clone()).collect();
        match self.store.insert_spans(&records).await {
            Ok(()) => {
                for (entry_id, _) in buffer.iter() {
                    if let Err(error) = log.ack(TOPIC, GROUP, entry_id).await {
                        warn!(%entry_id, %error, "ack failed after successful bulk insert");
                    }
                }
                debug!(count = buffer.len(), "flushed span batch");
                buffer.clear();
            }
            Err(error) => {
                warn!(%error, count = buffer.len(), "bulk insert failed, buffer retained for retry");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentstack_core::Span;
    use agentstack_durablelog::InMemoryLog;
    use agentstack_store::SqliteAnalyticalStore;

    async fn sqlite_store() -> (Arc<SqliteAnalyticalStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteAnalyticalStore::open(dir.path().join("a.db").to_str().unwrap())
            .await
            .unwrap();
        (Arc::new(store), dir)
    }

    fn sample_record(name: &str) -> SpanRecord {
        let mut span = Span::start(name, "svc", None);
        span.end();
        span.to_record().unwrap()
    }

    #[tokio::test]
    async fn flushes_on_interval_and_acks_batch() {
        let (store, _dir) = sqlite_store().await;
        let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
        log.append(TOPIC, serde_json::to_value(sample_record("op")).unwrap())
            .await
            .unwrap();

        let writer = PersistentWriter {
            consumer_id: "w1".into(),
            store: store.clone(),
            flush_size: 1000,
            flush_interval: Duration::from_millis(30),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let log2 = Arc::clone(&log);
        let handle = tokio::spawn(async move { writer.run(log2, stop2).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.store(true, Ordering::Relaxed);
        handle.await.unwrap().unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spans")
            .fetch_one(store_pool(&store))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    fn store_pool(store: &Arc<SqliteAnalyticalStore>) -> &sqlx::SqlitePool {
        store.pool()
    }

    #[tokio::test]
    async fn invalid_span_is_dropped_and_acked_not_buffered() {
        let (store, _dir) = sqlite_store().await;
        let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
        log.append(TOPIC, serde_json::json!({"not": "a span"}))
            .await
            .unwrap();

        let writer = PersistentWriter::new("w1", store.clone());
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let log2 = Arc::clone(&log);
        let handle = tokio::spawn(async move { writer.run(log2, stop2).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.store(true, Ordering::Relaxed);
        handle.await.unwrap().unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spans")
            .fetch_one(store_pool(&store))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
