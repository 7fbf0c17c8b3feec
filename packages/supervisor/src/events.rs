//! Lifecycle event observers.
//!
//! Observers are invoked synchronously on the tick/request path, so handlers
//! must not block; anything slow should hand off to its own task. A
//! panicking observer is logged and swallowed.

use crate::types::{Task, TaskResult, Worker};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Fire-and-forget lifecycle notifications. All methods default to no-ops so
/// observers implement only what they care about.
pub trait OrchestratorEvents: Send + Sync {
    fn on_task_assigned(&self, _task: &Task, _worker: &Worker) {}
    fn on_task_completed(&self, _result: &TaskResult) {}
    fn on_task_failed(&self, _task: &Task, _error: &str) {}
    fn on_worker_online(&self, _worker: &Worker) {}
    fn on_worker_offline(&self, _worker: &Worker) {}
}

/// Run one observer callback, isolating panics from core state.
pub(crate) fn emit(handler: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(handler, "Event observer panicked, continuing");
    }
}

/// Observer that logs every lifecycle event.
pub struct LoggingEvents;

impl OrchestratorEvents for LoggingEvents {
    fn on_task_assigned(&self, task: &Task, worker: &Worker) {
        tracing::info!(task_id = %task.id, worker_id = %worker.id, "Task assigned");
    }

    fn on_task_completed(&self, result: &TaskResult) {
        tracing::info!(
            task_id = %result.task_id,
            worker_id = %result.worker_id,
            duration_ms = result.duration_ms,
            "Task completed"
        );
    }

    fn on_task_failed(&self, task: &Task, error: &str) {
        tracing::warn!(task_id = %task.id, retries = task.retries, error, "Task failed");
    }

    fn on_worker_online(&self, worker: &Worker) {
        tracing::info!(worker_id = %worker.id, "Worker online");
    }

    fn on_worker_offline(&self, worker: &Worker) {
        tracing::warn!(worker_id = %worker.id, "Worker offline");
    }
}
