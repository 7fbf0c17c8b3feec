//! Error taxonomy for supervisor operations.

/// Result alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Errors surfaced by core operations.
///
/// Everything else (timeouts, lost workers, observer panics) is absorbed
/// internally and translated into status changes or events.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Worker {worker_id} is not registered")]
    WorkerNotFound { worker_id: String },

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("Task queue is full (limit {limit})")]
    QueueFull { limit: usize },
}

impl SupervisorError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
