//! Wall-clock and monotonic-clock helpers.
//!
//! Duration is always computed from the monotonic pair; the wall-clock pair
//! is for display and cross-process correlation only and must never be used
//! to derive a duration (it is not monotonic across NTP adjustments).

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch nanoseconds.
#[must_use]
pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// A single monotonic clock reading, opaque outside this module.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicInstant(Instant);

/// Current monotonic clock reading.
#[must_use]
pub fn monotonic_now() -> MonotonicInstant {
    MonotonicInstant(Instant::now())
}

/// Milliseconds elapsed between two monotonic readings, saturating at zero.
#[must_use]
pub fn duration_ms(start: MonotonicInstant, end: MonotonicInstant) -> u64 {
    end.0.saturating_duration_since(start.0).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_nonnegative_and_monotonic() {
        let start = monotonic_now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let end = monotonic_now();
        assert!(duration_ms(start, end) >= 5);
    }

    #[test]
    fn wall_clock_increases() {
        let a = wall_clock_ns();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = wall_clock_ns();
        assert!(b >= a);
    }
}
