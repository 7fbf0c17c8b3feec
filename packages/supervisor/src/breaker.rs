//! Per-worker circuit breaker.
//!
//! Tracks request outcomes over a sliding time window and temporarily stops
//! routing to workers whose failure rate crosses the threshold. Advisory by
//! itself; the orchestrator consults it before routing.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Windowed failure rate in `(0, 1]` that trips the breaker.
    pub failure_threshold: f64,
    /// Minimum windowed samples before the rate is meaningful.
    pub minimum_requests: usize,
    /// Sliding window over which outcomes are counted.
    pub window_ms: u64,
    /// How long an open breaker rejects before allowing probes.
    pub cooldown_ms: u64,
    /// Consecutive probe successes needed to close again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            minimum_requests: 5,
            window_ms: 60_000,
            cooldown_ms: 30_000,
            success_threshold: 3,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting requests until cooldown elapses.
    Open,
    /// Cooldown elapsed; probes are admitted.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    success: bool,
}

/// Point-in-time breaker snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStats {
    pub state: CircuitState,
    /// Samples currently inside the window.
    pub requests: usize,
    /// Failures currently inside the window.
    pub failures: usize,
    pub failure_rate: f64,
}

/// Three-state failure isolator for a single identity.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: CircuitState,
    samples: Vec<Sample>,
    half_open_successes: u32,
    last_failure: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            samples: Vec::new(),
            half_open_successes: 0,
            last_failure: None,
        }
    }

    /// Check whether a request may proceed. An open breaker whose cooldown
    /// has elapsed moves to half-open and admits the call as a probe.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self.last_failure.is_some_and(|last| {
                    Utc::now() - last >= Duration::milliseconds(self.config.cooldown_ms as i64)
                });
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    tracing::info!("Circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        let now = Utc::now();
        match self.state {
            CircuitState::Closed => {
                self.samples.push(Sample { at: now, success: true });
                self.prune(now);
            }
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.samples.clear();
                    self.half_open_successes = 0;
                    tracing::info!("Circuit closed, probes succeeded");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request; may trip the breaker.
    pub fn record_failure(&mut self) {
        let now = Utc::now();
        self.last_failure = Some(now);

        match self.state {
            CircuitState::Closed => {
                self.samples.push(Sample { at: now, success: false });
                self.prune(now);

                let total = self.samples.len();
                let failures = self.samples.iter().filter(|s| !s.success).count();
                if total >= self.config.minimum_requests
                    && failures as f64 / total as f64 >= self.config.failure_threshold
                {
                    self.state = CircuitState::Open;
                    tracing::warn!(
                        failures,
                        requests = total,
                        "Circuit opened, failure rate over threshold"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                tracing::warn!("Circuit reopened, probe failed");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without evaluating the cooldown transition.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Windowed counters and failure rate.
    pub fn stats(&mut self) -> BreakerStats {
        self.prune(Utc::now());
        let requests = self.samples.len();
        let failures = self.samples.iter().filter(|s| !s.success).count();
        BreakerStats {
            state: self.state,
            requests,
            failures,
            failure_rate: if requests == 0 {
                0.0
            } else {
                failures as f64 / requests as f64
            },
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::milliseconds(self.config.window_ms as i64);
        self.samples.retain(|s| s.at > cutoff);
    }
}

/// Lazily-created breakers keyed by worker id.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Shorthand for `can_execute` on the worker's breaker.
    pub fn is_available(&self, worker_id: &str) -> bool {
        let mut breakers = self.breakers.lock();
        self.entry(&mut breakers, worker_id).can_execute()
    }

    pub fn record_success(&self, worker_id: &str) {
        let mut breakers = self.breakers.lock();
        self.entry(&mut breakers, worker_id).record_success();
    }

    pub fn record_failure(&self, worker_id: &str) {
        let mut breakers = self.breakers.lock();
        self.entry(&mut breakers, worker_id).record_failure();
    }

    /// Snapshot of every tracked breaker.
    pub fn all_stats(&self) -> HashMap<String, BreakerStats> {
        let mut breakers = self.breakers.lock();
        breakers
            .iter_mut()
            .map(|(id, b)| (id.clone(), b.stats()))
            .collect()
    }

    /// Ids whose breaker is currently open.
    pub fn open_circuits(&self) -> Vec<String> {
        let breakers = self.breakers.lock();
        breakers
            .iter()
            .filter(|(_, b)| b.state() == CircuitState::Open)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Reset one breaker to closed.
    pub fn reset(&self, worker_id: &str) {
        let mut breakers = self.breakers.lock();
        breakers.insert(
            worker_id.to_string(),
            CircuitBreaker::new(self.config.clone()),
        );
    }

    /// Reset every breaker.
    pub fn reset_all(&self) {
        self.breakers.lock().clear();
    }

    /// Drop tracking for an unregistered worker.
    pub fn remove(&self, worker_id: &str) {
        self.breakers.lock().remove(worker_id);
    }

    fn entry<'a>(
        &self,
        breakers: &'a mut HashMap<String, CircuitBreaker>,
        worker_id: &str,
    ) -> &'a mut CircuitBreaker {
        breakers
            .entry(worker_id.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.config.clone()))
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 0.5,
            minimum_requests: 4,
            window_ms: 10_000,
            cooldown_ms: 200,
            success_threshold: 2,
        }
    }

    #[test]
    fn test_stays_closed_below_minimum_requests() {
        let mut breaker = CircuitBreaker::new(quick_config());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut breaker = CircuitBreaker::new(quick_config());

        for _ in 0..4 {
            breaker.record_failure();
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_successes_keep_rate_below_threshold() {
        let mut breaker = CircuitBreaker::new(quick_config());

        for _ in 0..5 {
            breaker.record_success();
        }
        breaker.record_failure();
        breaker.record_failure();

        // 2 failures out of 7 is under 50%.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_cooldown_then_half_open_then_closed() {
        let mut breaker = CircuitBreaker::new(quick_config());

        for _ in 0..4 {
            breaker.record_failure();
        }
        assert!(!breaker.can_execute());

        std::thread::sleep(std::time::Duration::from_millis(220));

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        // Closing cleared the window; one failure does not re-trip.
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut breaker = CircuitBreaker::new(quick_config());

        for _ in 0..4 {
            breaker.record_failure();
        }
        std::thread::sleep(std::time::Duration::from_millis(220));
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_registry_tracks_workers_independently() {
        let registry = BreakerRegistry::new(quick_config());

        for _ in 0..4 {
            registry.record_failure("w1");
        }

        assert!(!registry.is_available("w1"));
        assert!(registry.is_available("w2"));
        assert_eq!(registry.open_circuits(), vec!["w1".to_string()]);

        registry.reset("w1");
        assert!(registry.is_available("w1"));
        assert!(registry.open_circuits().is_empty());
    }

    #[test]
    fn test_registry_stats() {
        let registry = BreakerRegistry::new(quick_config());

        registry.record_success("w1");
        registry.record_failure("w1");

        let stats = registry.all_stats();
        let w1 = &stats["w1"];
        assert_eq!(w1.requests, 2);
        assert_eq!(w1.failures, 1);
        assert!((w1.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(w1.state, CircuitState::Closed);
    }
}
