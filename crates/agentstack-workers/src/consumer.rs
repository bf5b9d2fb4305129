//! The shared consumer loop: connect, idempotently create the group, read,
//! dispatch to `process`, ack, repeat.
//!
//! Grounded on `original_source/.../consumer.py`'s `BaseConsumer`, including
//! its fail-fast startup contract (don't run a worker whose consumer group
//! could not be created) and its "sleep 1s and continue" handling of an
//! unexpected error mid-loop. The persistent writer and cost worker
//! (§4.10/§4.11) do not use this trait — they buffer and batch-ack, built
//! directly on [`agentstack_durablelog::DurableLog`] — but the security
//! worker's ack-per-entry-immediately-after-processing shape matches this
//! loop exactly, so it implements [`Consumer`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentstack_durablelog::{DurableLog, LogEntry};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WorkerError};

/// Shared parameters every consumer worker is configured with.
pub trait ConsumerIdentity: Send + Sync {
    /// The topic this consumer reads.
    fn topic(&self) -> &str;
    /// The consumer group name (shared across instances doing the same
    /// role — they partition the group's work).
    fn group(&self) -> &str;
    /// This instance's consumer id, for diagnostics.
    fn consumer_id(&self) -> &str;
    /// Entries requested per `read_group` call.
    fn batch_size(&self) -> usize {
        10
    }
    /// How long a `read_group` call blocks waiting for new entries.
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(500)
    }
}

/// A worker that processes one log entry at a time and acks immediately on
/// success (the default; see module docs for the workers that don't use
/// this trait).
#[async_trait]
pub trait Consumer: ConsumerIdentity {
    /// Handle one entry. Returning `Err` means the entry is not
    /// acknowledged — the intent is "requeue for redelivery"; the in-memory
    /// reference [`DurableLog`] adapter advances its per-group cursor on
    /// read rather than on ack (documented in `agentstack_durablelog::memory`),
    /// so in this workspace a failed entry is logged and not retried rather
    /// than truly redelivered. A real backing log with redelivery semantics
    /// would requeue it instead.
    async fn process(&self, entry_id: &str, payload: &serde_json::Value) -> Result<()>;

    /// Run the shared loop until `stop` is set. Fails fast (returns `Err`)
    /// if the consumer group cannot be created for a reason other than
    /// already existing.
    #[instrument(skip_all, fields(topic = %self.topic(), group = %self.group()))]
    async fn run(&self, log: Arc<dyn DurableLog>, stop: Arc<AtomicBool>) -> Result<()> {
        log.create_group(self.topic(), self.group())
            .await
            .map_err(|e| WorkerError::Fatal(format!("group creation failed: {e}")))?;
        info!(consumer_id = %self.consumer_id(), "consumer started");

        while !stop.load(Ordering::Relaxed) {
            let entries = match log
                .read_group(self.topic(), self.group(), self.batch_size(), self.poll_interval())
                .await
            {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(%error, "unexpected error reading from log, sleeping 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for entry in entries {
                self.process_and_ack(&log, &entry).await;
            }
        }
        info!("consumer loop stopped");
        Ok(())
    }

    /// Process a single entry, acking on success and logging (without
    /// retrying) on failure — see [`Consumer::process`]'s docs on the
    /// in-memory log's redelivery limitation.
    async fn process_and_ack(&self, log: &Arc<dyn DurableLog>, entry: &LogEntry) {
        match self.process(&entry.id, &entry.payload).await {
            Ok(()) => {
                if let Err(error) = log.ack(self.topic(), self.group(), &entry.id).await {
                    warn!(entry_id = %entry.id, %error, "ack failed after successful processing");
                }
            }
            Err(error) => {
                debug!(entry_id = %entry.id, %error, "processing failed, entry not acked");
            }
        }
    }
}
