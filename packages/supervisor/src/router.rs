//! Task router.
//!
//! Picks a worker for a task from a caller-supplied pool of available
//! workers. The pool is expected to be pre-filtered for liveness and
//! breaker state; the router only applies capability matching and the
//! configured selection strategy.

use crate::config::RoutingStrategy;
use crate::types::{Task, Worker};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy-based worker selection.
pub struct TaskRouter {
    strategy: RoutingStrategy,
    round_robin_cursor: AtomicUsize,
}

impl TaskRouter {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            round_robin_cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    /// Select a worker for the task, or `None` when the pool is empty.
    ///
    /// Workers that explicitly list the task type or accept any type are
    /// preferred; when no worker matches either way, the whole pool stays
    /// eligible so unmatched task types are still served.
    pub fn select(&self, task: &Task, pool: &[Worker]) -> Option<Worker> {
        if pool.is_empty() {
            return None;
        }

        let matching: Vec<&Worker> = pool
            .iter()
            .filter(|w| w.accepts_any_type() || w.has_capability(&task.task_type))
            .collect();
        let eligible: Vec<&Worker> = if matching.is_empty() {
            pool.iter().collect()
        } else {
            matching
        };

        let selected = match self.strategy {
            RoutingStrategy::RoundRobin => {
                let cursor = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed);
                eligible[cursor % eligible.len()]
            }
            RoutingStrategy::LeastLoaded => least_loaded(&eligible)?,
            RoutingStrategy::CapabilityMatch => {
                let explicit: Vec<&Worker> = eligible
                    .iter()
                    .copied()
                    .filter(|w| w.has_capability(&task.task_type))
                    .collect();
                if explicit.is_empty() {
                    least_loaded(&eligible)?
                } else {
                    least_loaded(&explicit)?
                }
            }
            RoutingStrategy::Random => {
                let index = rand::rng().random_range(0..eligible.len());
                eligible[index]
            }
        };

        Some(selected.clone())
    }
}

fn load_ratio(worker: &Worker) -> f64 {
    if worker.max_load == 0 {
        1.0
    } else {
        f64::from(worker.current_load) / f64::from(worker.max_load)
    }
}

/// Lowest load ratio wins; ties keep the earliest worker.
fn least_loaded<'a>(pool: &[&'a Worker]) -> Option<&'a Worker> {
    pool.iter().copied().fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) if load_ratio(candidate) < load_ratio(current) => Some(candidate),
        Some(current) => Some(current),
    })
}
