//! Composite worker health scoring.
//!
//! Blends load, success rate, recent latency, and availability into a single
//! score in `[0, 1]`. The score is advisory: it ranks workers but never
//! rejects requests on its own.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relative weight of each subscore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthWeights {
    pub load: f64,
    pub success: f64,
    pub latency: f64,
    pub availability: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            load: 0.30,
            success: 0.35,
            latency: 0.20,
            availability: 0.15,
        }
    }
}

impl HealthWeights {
    fn total(&self) -> f64 {
        self.load + self.success + self.latency + self.availability
    }
}

/// Scoring parameters.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub weights: HealthWeights,
    /// Latency at or above this scores 0.
    pub max_latency_ms: f64,
    /// Only latency samples newer than this count.
    pub latency_window_ms: u64,
    /// Below this many windowed samples the latency subscore is 1.
    pub min_latency_samples: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            weights: HealthWeights::default(),
            max_latency_ms: 10_000.0,
            latency_window_ms: 60_000,
            min_latency_samples: 5,
        }
    }
}

/// Subscores plus the weighted composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBreakdown {
    pub load: f64,
    pub success: f64,
    pub latency: f64,
    pub availability: f64,
    pub score: f64,
}

/// Outcome history for one worker.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    successes: u64,
    failures: u64,
    latencies: Vec<(DateTime<Utc>, f64)>,
    started_at: DateTime<Utc>,
    last_transition: DateTime<Utc>,
    accumulated_down_ms: i64,
    is_up: bool,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        let now = Utc::now();
        Self {
            config,
            successes: 0,
            failures: 0,
            latencies: Vec::new(),
            started_at: now,
            last_transition: now,
            accumulated_down_ms: 0,
            is_up: true,
        }
    }

    /// Record a successful execution and its latency.
    pub fn record_success(&mut self, latency_ms: f64) {
        self.successes += 1;
        let now = Utc::now();
        self.latencies.push((now, latency_ms));
        let cutoff = now - Duration::milliseconds(self.config.latency_window_ms as i64);
        self.latencies.retain(|(at, _)| *at > cutoff);
    }

    /// Record a failed execution.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Mark the worker reachable.
    pub fn mark_up(&mut self) {
        if !self.is_up {
            let now = Utc::now();
            self.accumulated_down_ms += (now - self.last_transition).num_milliseconds();
            self.last_transition = now;
            self.is_up = true;
        }
    }

    /// Mark the worker unreachable.
    pub fn mark_down(&mut self) {
        if self.is_up {
            self.last_transition = Utc::now();
            self.is_up = false;
        }
    }

    /// Composite score for the given load hint.
    pub fn score(&self, current_load: u32, max_load: u32) -> f64 {
        self.breakdown(current_load, max_load).score
    }

    /// Full subscore breakdown for the given load hint.
    pub fn breakdown(&self, current_load: u32, max_load: u32) -> HealthBreakdown {
        let load = if max_load == 0 {
            1.0
        } else {
            (1.0 - f64::from(current_load) / f64::from(max_load)).clamp(0.0, 1.0)
        };

        let samples = self.successes + self.failures;
        let success = if samples == 0 {
            1.0
        } else {
            self.successes as f64 / samples as f64
        };

        let latency = self.latency_score();
        let availability = self.availability_score();

        let weights = &self.config.weights;
        let total = weights.total();
        let score = if total <= 0.0 {
            0.0
        } else {
            (load * weights.load
                + success * weights.success
                + latency * weights.latency
                + availability * weights.availability)
                / total
        };

        HealthBreakdown {
            load,
            success,
            latency,
            availability,
            score,
        }
    }

    fn latency_score(&self) -> f64 {
        let cutoff = Utc::now() - Duration::milliseconds(self.config.latency_window_ms as i64);
        let windowed: Vec<f64> = self
            .latencies
            .iter()
            .filter(|(at, _)| *at > cutoff)
            .map(|(_, ms)| *ms)
            .collect();

        if windowed.len() < self.config.min_latency_samples {
            return 1.0;
        }

        let avg = windowed.iter().sum::<f64>() / windowed.len() as f64;
        (1.0 - avg / self.config.max_latency_ms).clamp(0.0, 1.0)
    }

    fn availability_score(&self) -> f64 {
        let now = Utc::now();
        let total_ms = (now - self.started_at).num_milliseconds();
        if total_ms <= 0 {
            return 1.0;
        }

        let mut down_ms = self.accumulated_down_ms;
        if !self.is_up {
            down_ms += (now - self.last_transition).num_milliseconds();
        }

        ((total_ms - down_ms) as f64 / total_ms as f64).clamp(0.0, 1.0)
    }
}

/// Health trackers keyed by worker id.
pub struct HealthRegistry {
    config: HealthConfig,
    trackers: RwLock<HashMap<String, HealthTracker>>,
}

impl HealthRegistry {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, worker_id: &str, latency_ms: f64) {
        self.with_tracker(worker_id, |t| t.record_success(latency_ms));
    }

    pub fn record_failure(&self, worker_id: &str) {
        self.with_tracker(worker_id, HealthTracker::record_failure);
    }

    pub fn mark_up(&self, worker_id: &str) {
        self.with_tracker(worker_id, HealthTracker::mark_up);
    }

    pub fn mark_down(&self, worker_id: &str) {
        self.with_tracker(worker_id, HealthTracker::mark_down);
    }

    /// Score a worker with the supplied load hint. Untracked workers score
    /// as a fresh tracker would.
    pub fn score(&self, worker_id: &str, current_load: u32, max_load: u32) -> f64 {
        let trackers = self.trackers.read();
        match trackers.get(worker_id) {
            Some(tracker) => tracker.score(current_load, max_load),
            None => HealthTracker::new(self.config.clone()).score(current_load, max_load),
        }
    }

    /// Pick the highest-scoring candidate from `(id, current_load, max_load)`
    /// hints. Ties keep the earliest candidate.
    pub fn healthiest(&self, candidates: &[(String, u32, u32)]) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for (id, current, max) in candidates {
            let score = self.score(id, *current, *max);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((id.as_str(), score));
            }
        }
        best.map(|(id, _)| id.to_string())
    }

    /// Drop tracking for an unregistered worker.
    pub fn remove(&self, worker_id: &str) {
        self.trackers.write().remove(worker_id);
    }

    fn with_tracker(&self, worker_id: &str, f: impl FnOnce(&mut HealthTracker)) {
        let mut trackers = self.trackers.write();
        let tracker = trackers
            .entry(worker_id.to_string())
            .or_insert_with(|| HealthTracker::new(self.config.clone()));
        f(tracker);
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
