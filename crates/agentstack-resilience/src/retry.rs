//! Bounded exponential backoff, generic over the operation's error type.
//!
//! Adapted from the gateway's provider-call retry policy, generalized with a
//! caller-supplied `is_retryable` predicate so it can drive the transport's
//! exact `1s, 2s, 4s` literal backoff without being tied to any one error
//! enum.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Retry/backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Exponential backoff multiplier.
    pub multiplier: f64,
    /// Jitter fraction in `[0.0, 1.0]`; `0.0` disables jitter for exact,
    /// testable delays.
    pub jitter: f64,
    /// HTTP status codes considered retryable, for callers that classify by
    /// status.
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.25,
            retry_on_status: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// The transport's literal backoff: 3 retries, `1s, 2s, 4s`, no jitter.
    #[must_use]
    pub fn transport_default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: 0.0,
            retry_on_status: vec![429, 500, 502, 503, 504],
        }
    }
}

/// A retry policy: delay schedule plus a bounded attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Build a policy from an explicit configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// The configuration backing this policy.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `status` is in the retryable status set.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.config.retry_on_status.contains(&status)
    }

    /// Delay for the given 0-indexed attempt, with jitter applied and capped
    /// at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as f64;
        let delay = base * self.config.multiplier.powi(attempt as i32);
        let delay = delay.min(self.config.max_delay.as_millis() as f64);

        if self.config.jitter <= 0.0 {
            return Duration::from_millis(delay as u64);
        }
        let jitter_range = delay * self.config.jitter;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }

    /// Run `operation`, retrying up to `max_retries` additional times when
    /// `is_retryable` returns `true` for the returned error. Sleeps
    /// `delay_for_attempt(attempt)` between tries.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted or the error is
    /// classified non-retryable.
    pub async fn execute<F, Fut, T, E>(
        &self,
        is_retryable: impl Fn(&E) -> bool,
        operation: F,
    ) -> Result<T, E>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for attempt in 0..=self.config.max_retries {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt == self.config.max_retries || !is_retryable(&error) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(attempt = attempt + 1, delay_ms = delay.as_millis(), "retrying after error");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("loop always returns within max_retries + 1 iterations")
    }
}
