//! The handoff point between span completion and the background exporter.
//!
//! Wraps [`agentstack_resilience::RingBuffer`] with the exporter's
//! size-triggered flush signal, so the tracer's hot path (`end()`) never has
//! to know about the exporter's internal scheduling.

use std::sync::Arc;

use agentstack_core::SpanRecord;
use agentstack_resilience::RingBuffer;
use tokio::sync::Notify;

/// Shared between the [`crate::tracer::Tracer`] (producer) and the
/// [`crate::exporter::BatchExporter`] (consumer).
pub struct ExportQueue {
    buffer: RingBuffer<SpanRecord>,
    batch_size: usize,
    /// Notified whenever the buffer reaches `batch_size`, so the exporter's
    /// wait-for-interval-or-signal loop wakes early.
    pub(crate) flush_signal: Notify,
}

impl ExportQueue {
    /// Create a queue with the given ring-buffer capacity and the batch size
    /// that triggers an eager flush signal.
    #[must_use]
    pub fn new(capacity: usize, batch_size: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer: RingBuffer::new(capacity),
            batch_size,
            flush_signal: Notify::new(),
        })
    }

    /// Push a completed span's record, signaling the exporter if the buffer
    /// has reached `batch_size`.
    pub fn push(&self, record: SpanRecord) {
        self.buffer.add(record);
        if self.buffer.size() >= self.batch_size {
            self.flush_signal.notify_one();
        }
    }

    /// Drain every buffered record for export.
    pub fn drain(&self) -> Vec<SpanRecord> {
        self.buffer.drain()
    }

    /// Current buffered count, for diagnostics.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    /// Total spans dropped because the ring buffer was at capacity.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_below_batch_size_does_not_panic_and_is_drainable() {
        let queue = ExportQueue::new(10, 4);
        queue.push(sample());
        queue.push(sample());
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.drain().len(), 2);
        assert_eq!(queue.size(), 0);
    }

    fn sample() -> SpanRecord {
        let mut span = agentstack_core::Span::start("op", "svc", None);
        span.end();
        span.to_record().unwrap()
    }
}
