//! Supervisor configuration.
//!
//! All knobs have conservative defaults and can be overridden through
//! `SUPERVISOR_*` environment variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Worker-selection strategy used by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Cycle through eligible workers.
    RoundRobin,
    /// Pick the worker with the lowest load ratio.
    LeastLoaded,
    /// Prefer workers that explicitly list the task type.
    CapabilityMatch,
    /// Uniform random pick.
    Random,
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Self::RoundRobin),
            "least-loaded" => Ok(Self::LeastLoaded),
            "capability-match" => Ok(Self::CapabilityMatch),
            "random" => Ok(Self::Random),
            other => Err(format!("Unknown routing strategy: {other}")),
        }
    }
}

/// Tunables for the orchestrator and worker registry.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How the router picks a worker for a task.
    pub routing_strategy: RoutingStrategy,
    /// Expected interval between worker heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Heartbeats a worker may miss before it is marked offline.
    pub missed_heartbeats_threshold: u32,
    /// Deadline applied to submissions that omit one.
    pub default_task_timeout_ms: u64,
    /// Retry budget applied to submissions that omit one.
    pub default_max_retries: u32,
    /// Upper bound on the pending queue.
    pub max_queue_size: usize,
    /// Cadence of the assignment tick.
    pub assignment_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::LeastLoaded,
            heartbeat_interval_ms: 30_000,
            missed_heartbeats_threshold: 3,
            default_task_timeout_ms: 60_000,
            default_max_retries: 2,
            max_queue_size: 1000,
            assignment_interval_ms: 1_000,
        }
    }
}

impl SupervisorConfig {
    /// Build a config from `SUPERVISOR_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            routing_strategy: env_parse("SUPERVISOR_ROUTING_STRATEGY", defaults.routing_strategy),
            heartbeat_interval_ms: env_parse(
                "SUPERVISOR_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval_ms,
            ),
            missed_heartbeats_threshold: env_parse(
                "SUPERVISOR_MISSED_HEARTBEATS_THRESHOLD",
                defaults.missed_heartbeats_threshold,
            ),
            default_task_timeout_ms: env_parse(
                "SUPERVISOR_DEFAULT_TASK_TIMEOUT_MS",
                defaults.default_task_timeout_ms,
            ),
            default_max_retries: env_parse(
                "SUPERVISOR_DEFAULT_MAX_RETRIES",
                defaults.default_max_retries,
            ),
            max_queue_size: env_parse("SUPERVISOR_MAX_QUEUE_SIZE", defaults.max_queue_size),
            assignment_interval_ms: env_parse(
                "SUPERVISOR_ASSIGNMENT_INTERVAL_MS",
                defaults.assignment_interval_ms,
            ),
        }
    }

    /// Silence window after which a worker is considered lost.
    pub fn offline_after_ms(&self) -> u64 {
        self.heartbeat_interval_ms * u64::from(self.missed_heartbeats_threshold)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.routing_strategy, RoutingStrategy::LeastLoaded);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.missed_heartbeats_threshold, 3);
        assert_eq!(config.default_task_timeout_ms, 60_000);
        assert_eq!(config.default_max_retries, 2);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.offline_after_ms(), 90_000);
    }

    #[test]
    fn test_strategy_wire_names() {
        assert_eq!(
            "round-robin".parse::<RoutingStrategy>().unwrap(),
            RoutingStrategy::RoundRobin
        );
        assert_eq!(
            "capability-match".parse::<RoutingStrategy>().unwrap(),
            RoutingStrategy::CapabilityMatch
        );
        assert!("weighted".parse::<RoutingStrategy>().is_err());

        let json = serde_json::to_string(&RoutingStrategy::LeastLoaded).unwrap();
        assert_eq!(json, "\"least-loaded\"");
    }
}
