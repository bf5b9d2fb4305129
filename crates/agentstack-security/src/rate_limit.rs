//! Per-IP request rate limiting for the ingest gateway.
//!
//! No direct analog exists in the teacher beyond config structs
//! (`RateLimitingSettings`) and the allow/block-list style of its IP filter;
//! this counter is authored fresh in that idiom: a sharded map of
//! `IpAddr -> (count, window_start)`, reset when the rolling window elapses,
//! with stale entries purged opportunistically every `purge_every`th request
//! rather than by a separate background sweep task.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{Result, SecurityError};

struct Window {
    count: u32,
    started_at: Instant,
}

/// Fixed-window, per-IP request counter.
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    limit_per_window: u32,
    window: Duration,
    purge_every: u64,
    requests_seen: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter allowing `limit_per_window` requests per `window`
    /// per IP, purging stale entries roughly every `purge_every` requests.
    #[must_use]
    pub fn new(limit_per_window: u32, window: Duration, purge_every: u64) -> Self {
        Self {
            windows: DashMap::new(),
            limit_per_window,
            window,
            purge_every: purge_every.max(1),
            requests_seen: AtomicU64::new(0),
        }
    }

    /// The gateway's documented default: 100 requests per 60s window.
    #[must_use]
    pub fn default_gateway() -> Self {
        Self::new(100, Duration::from_secs(60), 1000)
    }

    /// Record a request from `ip`, returning an error once the window's
    /// budget is exhausted.
    ///
    /// # Errors
    /// Returns [`SecurityError::RateLimited`] once `ip` has made
    /// `limit_per_window` requests within the current window.
    pub fn check(&self, ip: IpAddr) -> Result<()> {
        let seen = self.requests_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.purge_every == 0 {
            self.purge_stale();
        }

        let now = Instant::now();
        let mut entry = self.windows.entry(ip).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.count = 0;
            entry.started_at = now;
        }

        entry.count += 1;
        if entry.count > self.limit_per_window {
            return Err(SecurityError::RateLimited);
        }
        Ok(())
    }

    fn purge_stale(&self) {
        let now = Instant::now();
        let window = self.window;
        self.windows
            .retain(|_, w| now.duration_since(w.started_at) < window);
    }

    /// Number of distinct IPs currently tracked.
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), 1000);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..3 {
            limiter.check(ip).unwrap();
        }
        assert!(matches!(
            limiter.check(ip).unwrap_err(),
            SecurityError::RateLimited
        ));
    }

    #[test]
    fn separate_ips_have_independent_budgets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), 1000);
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        limiter.check(a).unwrap();
        limiter.check(b).unwrap();
        assert!(limiter.check(a).is_err());
        assert!(limiter.check(b).is_err());
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20), 1000);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        limiter.check(ip).unwrap();
        assert!(limiter.check(ip).is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check(ip).is_ok());
    }

    #[test]
    fn opportunistic_purge_drops_stale_entries() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10), 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        limiter.check(a).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        limiter.check(b).unwrap();
        assert_eq!(limiter.tracked_ips(), 1);
    }
}
