//! The `DurableLog` trait: the gateway's and workers' view of an append-only,
//! consumer-group topic.
//!
//! Grounded on `RedisWriter`/`BaseConsumer` in the original collector and
//! workers packages, generalized behind a trait rather than hardcoding a
//! Redis Streams client so this workspace can ship a dependency-free
//! in-memory reference adapter instead of fabricating a Redis dependency
//! this exercise has no way to actually exercise.

use std::time::Duration;

use async_trait::async_trait;

use crate::entry::LogEntry;
use crate::error::Result;

/// An append-only log of JSON-valued entries, partitioned by `topic`, with
/// consumer-group semantics: each named group independently tracks its own
/// read position, and within a group each entry is delivered to exactly one
/// reader.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Append `payload` to `topic`, trimming the oldest entries once the
    /// topic exceeds its retention cap. Returns the new entry's id.
    async fn append(&self, topic: &str, payload: serde_json::Value) -> Result<String>;

    /// Create `group` on `topic` starting at the current tail (`$`), i.e. the
    /// group only sees entries appended after this call. Creating an
    /// already-existing group is a no-op, not an error — callers fail fast
    /// only on a genuine creation failure.
    async fn create_group(&self, topic: &str, group: &str) -> Result<()>;

    /// Read up to `count` undelivered entries for `group` on `topic`,
    /// blocking up to `block` for at least one entry to become available.
    /// Returns an empty `Vec` on timeout, never an error.
    async fn read_group(
        &self,
        topic: &str,
        group: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<LogEntry>>;

    /// Acknowledge `entry_id` as processed by `group`.
    async fn ack(&self, topic: &str, group: &str, entry_id: &str) -> Result<()>;

    /// Read entries appended to `topic` after `after_id` (`"$"` meaning
    /// "only entries appended from now on"), blocking up to `block`. Used by
    /// the live broadcaster, which has no consumer group of its own and
    /// never acks.
    async fn tail(&self, topic: &str, after_id: &str, block: Duration) -> Result<Vec<LogEntry>>;
}
