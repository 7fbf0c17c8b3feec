//! Flotilla Supervisor: control plane for a horizontally-scaled worker fleet.
//!
//! A single supervisor process accepts task submissions, tracks worker
//! membership and liveness through heartbeats, routes each task to a
//! suitable worker, and drives the task lifecycle through assignment,
//! execution, retry, timeout, and completion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  HTTP control plane                      │
//! │   /workers/*        /tasks/*        /status  /health     │
//! └───────────────────────────┬──────────────────────────────┘
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Orchestrator                        │
//! │  pending queue ─▶ assignment tick ─▶ active ─▶ results   │
//! │                        │                                 │
//! │        ┌───────────────┼────────────────┐                │
//! │        ▼               ▼                ▼                │
//! │  WorkerRegistry    TaskRouter    BreakerRegistry         │
//! │  (heartbeats)      (strategy)    + HealthRegistry        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers are external processes: they register, heartbeat, receive
//! dispatched tasks over HTTP, and POST results back. All state is held in
//! memory for the lifetime of the process.

pub mod backoff;
pub mod breaker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod router;
pub mod types;

// Re-exports
pub use backoff::{BackoffConfig, ExponentialBackoff, RetryError, RetryPolicy};
pub use breaker::{BreakerConfig, BreakerRegistry, BreakerStats, CircuitBreaker, CircuitState};
pub use config::{RoutingStrategy, SupervisorConfig};
pub use dispatch::TaskDispatcher;
pub use error::{SupervisorError, SupervisorResult};
pub use events::{LoggingEvents, OrchestratorEvents};
pub use health::{HealthBreakdown, HealthConfig, HealthRegistry, HealthTracker, HealthWeights};
pub use orchestrator::Orchestrator;
pub use queue::TaskQueue;
pub use registry::WorkerRegistry;
pub use router::TaskRouter;
pub use types::{
    HeartbeatPayload, RegistryStats, SupervisorStats, Task, TaskPriority, TaskResult, TaskStats,
    TaskStatus, TaskSubmission, Worker, WorkerStatus,
};
