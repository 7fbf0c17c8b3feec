//! Task dispatch to worker endpoints.
//!
//! Delivers each assignment to the worker's HTTP endpoint. Delivery is
//! fire-and-forget: a failed POST is only logged, and the timeout sweep
//! reclaims the task if the worker never reports a result.

use crate::events::OrchestratorEvents;
use crate::types::{Task, Worker};

/// Observer that POSTs assigned tasks to `{endpoint}/tasks/execute`.
pub struct TaskDispatcher {
    client: reqwest::Client,
}

impl TaskDispatcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    fn execute_url(endpoint: &str) -> String {
        format!("{}/tasks/execute", endpoint.trim_end_matches('/'))
    }
}

impl Default for TaskDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorEvents for TaskDispatcher {
    fn on_task_assigned(&self, task: &Task, worker: &Worker) {
        let url = Self::execute_url(&worker.endpoint);
        let client = self.client.clone();
        let task = task.clone();
        let worker_id = worker.id.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&task).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(task_id = %task.id, worker_id = %worker_id, "Task dispatched");
                }
                Ok(response) => {
                    tracing::warn!(
                        task_id = %task.id,
                        worker_id = %worker_id,
                        status = %response.status(),
                        "Worker rejected dispatch, timeout sweep will reclaim the task"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task.id,
                        worker_id = %worker_id,
                        error = %e,
                        "Task dispatch failed, timeout sweep will reclaim the task"
                    );
                }
            }
        });
    }
}
