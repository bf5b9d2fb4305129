//! Fixed-capacity, drop-oldest FIFO.
//!
//! Grounded on the SDK's `RingBuffer` (a `deque(maxlen=capacity)` guarded by a
//! lock in the original): `add` and `drain` are mutually exclusive under a
//! single [`parking_lot::Mutex`] and never suspend inside the critical
//! section.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Bounded drop-oldest queue. Never blocks the caller beyond the lock itself.
pub struct RingBuffer<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    items: VecDeque<T>,
    dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer with the given fixed capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(4096)),
                dropped: 0,
            }),
        }
    }

    /// Append `item`. If the buffer is at capacity, the oldest item is
    /// dropped first and the dropped counter incremented.
    pub fn add(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
        }
        inner.items.push_back(item);
    }

    /// Atomically take every buffered item, leaving the buffer empty.
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.items.drain(..).collect()
    }

    /// Current number of buffered items.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Fixed capacity of the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items dropped over the buffer's lifetime.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_beyond_capacity() {
        let buf = RingBuffer::new(3);
        for i in 0..5 {
            buf.add(i);
        }
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.dropped(), 2);
        assert_eq!(buf.drain(), vec![2, 3, 4]);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buf = RingBuffer::new(4);
        buf.add(1);
        buf.add(2);
        assert_eq!(buf.drain(), vec![1, 2]);
        assert_eq!(buf.size(), 0);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn capacity_n_given_m_adds_matches_invariant() {
        let n = 10;
        let m = 27;
        let buf = RingBuffer::new(n);
        for i in 0..m {
            buf.add(i);
        }
        assert_eq!(buf.size(), n);
        assert_eq!(buf.dropped(), (m - n) as u64);
        let drained = buf.drain();
        let expected: Vec<i32> = ((m - n as i32)..m).collect();
        assert_eq!(drained, expected);
    }
}
