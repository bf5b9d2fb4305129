//! The unit of data moving through a durable log topic.

use serde::{Deserialize, Serialize};

/// One appended record. `id` is assigned by the log and is monotonically
/// increasing within a topic, mirroring a stream entry id well enough for
/// cursor comparisons (`>`) without depending on any particular backend's id
/// format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonically increasing id, unique within the topic.
    pub id: String,
    /// The record payload. Callers agree on shape per topic (e.g. a
    /// `SpanRecord` on `spans.ingest`, an alert notification on
    /// `alerts.live`).
    pub payload: serde_json::Value,
}
