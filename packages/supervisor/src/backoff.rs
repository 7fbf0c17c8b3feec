//! Capped exponential backoff with symmetric jitter, plus an async retry
//! helper built on top of it.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Delay for attempt 0, before jitter.
    pub base_delay_ms: u64,
    /// Ceiling applied before jitter.
    pub max_delay_ms: u64,
    /// Jitter fraction in `[0, 1]`; the delay is scaled by `1 + u * jitter`
    /// with `u` uniform in `[-1, 1]`.
    pub jitter: f64,
    /// Total attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            jitter: 0.25,
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// Delay for a 0-indexed attempt: `min(max, base * 2^attempt)`, jittered.
    ///
    /// With `jitter = 0` the result is exact and deterministic.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay_ms) as f64;

        let delayed = if self.jitter > 0.0 {
            let u: f64 = rand::rng().random_range(-1.0..=1.0);
            capped * (1.0 + u * self.jitter)
        } else {
            capped
        };

        Duration::from_millis(delayed.round().max(0.0) as u64)
    }
}

/// Stateful backoff iterator. Each `next_delay` call advances the attempt
/// counter until the budget is exhausted.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay for the next attempt, or `None` once `max_attempts` is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.calculate_delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Rewind to attempt 0.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Classifies an operation failure for the retry helper.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Do not retry; the error is returned immediately.
    Permanent(E),
    /// Retry after the next backoff delay.
    Transient(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent(e) | Self::Transient(e) => e,
        }
    }
}

/// Retries an async operation with exponential backoff between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget runs out. Exhaustion returns the last error.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryError<E>>>,
    {
        self.execute_observed(operation, |_, _, _| {}).await
    }

    /// Like [`execute`](Self::execute), invoking `on_retry(attempt, delay,
    /// error)` before each backoff sleep.
    pub async fn execute_observed<F, Fut, T, E, O>(
        &self,
        mut operation: F,
        mut on_retry: O,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryError<E>>>,
        O: FnMut(u32, Duration, &E),
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(RetryError::Permanent(e)) => return Err(e),
                Err(RetryError::Transient(e)) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(e);
                    }
                    let delay = self.config.calculate_delay(attempt - 1);
                    on_retry(attempt, delay, &e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let config = no_jitter(10);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(800));
        // 100 * 2^4 = 1600, capped at 1000
        assert_eq!(config.calculate_delay(4), Duration::from_millis(1_000));
        assert_eq!(config.calculate_delay(20), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let config = BackoffConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: 0.5,
            max_attempts: 5,
        };

        for _ in 0..100 {
            let delay = config.calculate_delay(0).as_millis() as u64;
            assert!((500..=1_500).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn test_iterator_exhausts() {
        let mut backoff = ExponentialBackoff::new(no_jitter(3));

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(BackoffConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
            max_attempts: 5,
        });

        let result: Result<u32, &str> = policy
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(RetryError::Transient("not yet"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(no_jitter(5));

        let result: Result<(), &str> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RetryError::Permanent("bad request")) }
            })
            .await;

        assert_eq!(result, Err("bad request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let retries_seen = AtomicU32::new(0);
        let policy = RetryPolicy::new(BackoffConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
            max_attempts: 3,
        });

        let result: Result<(), String> = policy
            .execute_observed(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(RetryError::Transient(format!("attempt {n}"))) }
                },
                |_, _, _| {
                    retries_seen.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(result, Err("attempt 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Observer fires before each sleep, not after the final failure.
        assert_eq!(retries_seen.load(Ordering::SeqCst), 2);
    }
}
