//! Task lifecycle orchestration.
//!
//! Owns the pending queue, the active-task table, and the results table, and
//! drives the periodic assignment and liveness ticks. The three task
//! collections live behind one lock so every lifecycle transition moves a
//! task atomically between them: a task is always in exactly one of queue,
//! active, or results.

use crate::breaker::{BreakerConfig, BreakerRegistry};
use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::events::{self, OrchestratorEvents};
use crate::health::{HealthConfig, HealthRegistry};
use crate::queue::TaskQueue;
use crate::registry::WorkerRegistry;
use crate::router::TaskRouter;
use crate::types::{
    HeartbeatPayload, SupervisorStats, Task, TaskResult, TaskStats, TaskStatus, TaskSubmission,
    Worker, WorkerStatus,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct TaskTable {
    queue: TaskQueue,
    active: HashMap<String, Task>,
    results: HashMap<String, TaskResult>,
}

enum ReportOutcome {
    Completed(Task),
    Requeued(Task),
    Failed(Task),
}

/// The supervisor core: registry, router, resilience wiring, and the task
/// lifecycle state machine.
pub struct Orchestrator {
    config: SupervisorConfig,
    registry: Arc<WorkerRegistry>,
    router: TaskRouter,
    breakers: Arc<BreakerRegistry>,
    health: Arc<HealthRegistry>,
    tasks: Mutex<TaskTable>,
    observers: RwLock<Vec<Arc<dyn OrchestratorEvents>>>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: SupervisorConfig) -> Self {
        let registry = Arc::new(WorkerRegistry::new(
            config.heartbeat_interval_ms,
            config.missed_heartbeats_threshold,
        ));
        let router = TaskRouter::new(config.routing_strategy);

        Self {
            config,
            registry,
            router,
            breakers: Arc::new(BreakerRegistry::default()),
            health: Arc::new(HealthRegistry::default()),
            tasks: Mutex::new(TaskTable::default()),
            observers: RwLock::new(Vec::new()),
            tickers: Mutex::new(Vec::new()),
        }
    }

    /// Override circuit-breaker tuning.
    pub fn with_breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breakers = Arc::new(BreakerRegistry::new(config));
        self
    }

    /// Override health-scoring tuning.
    pub fn with_health_config(mut self, config: HealthConfig) -> Self {
        self.health = Arc::new(HealthRegistry::new(config));
        self
    }

    /// Attach a lifecycle observer.
    pub fn add_observer(&self, observer: Arc<dyn OrchestratorEvents>) {
        self.observers.write().push(observer);
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Spawn the liveness and assignment tickers. Idempotent.
    pub fn start(self: Arc<Self>) {
        let mut tickers = self.tickers.lock();
        if !tickers.is_empty() {
            return;
        }

        let this = Arc::clone(&self);
        tickers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                this.config.heartbeat_interval_ms,
            ));
            loop {
                interval.tick().await;
                this.run_liveness_tick().await;
            }
        }));

        let this = Arc::clone(&self);
        tickers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                this.config.assignment_interval_ms,
            ));
            loop {
                interval.tick().await;
                this.run_assignment_tick().await;
            }
        }));

        tracing::info!(strategy = ?self.config.routing_strategy, "Supervisor ticks started");
    }

    /// Halt the tickers. The queue is not drained.
    pub fn stop(&self) {
        let mut tickers = self.tickers.lock();
        if tickers.is_empty() {
            return;
        }
        for handle in tickers.drain(..) {
            handle.abort();
        }
        tracing::info!("Supervisor ticks stopped");
    }

    /// Register a worker (or refresh an existing registration).
    pub async fn register_worker(&self, worker: Worker) -> Worker {
        let worker = self.registry.register(worker).await;
        self.health.mark_up(&worker.id);
        self.notify("on_worker_online", |o| o.on_worker_online(&worker));
        worker
    }

    /// Apply a worker heartbeat. Unknown ids are ignored.
    pub async fn heartbeat(&self, payload: HeartbeatPayload) -> Option<Worker> {
        let (worker, previous) = self.registry.heartbeat(payload).await?;

        if previous == WorkerStatus::Offline && worker.status != WorkerStatus::Offline {
            self.health.mark_up(&worker.id);
            self.notify("on_worker_online", |o| o.on_worker_online(&worker));
        }

        Some(worker)
    }

    /// Remove a worker and its resilience tracking.
    pub async fn unregister_worker(&self, worker_id: &str) -> bool {
        let removed = self.registry.unregister(worker_id).await;
        if removed {
            self.breakers.remove(worker_id);
            self.health.remove(worker_id);
        }
        removed
    }

    /// Accept a task submission into the pending queue.
    pub fn submit_task(&self, submission: TaskSubmission) -> SupervisorResult<Task> {
        if submission.task_type.trim().is_empty() {
            return Err(SupervisorError::validation("Task type must not be empty"));
        }

        let mut tasks = self.tasks.lock();
        if tasks.queue.len() >= self.config.max_queue_size {
            return Err(SupervisorError::QueueFull {
                limit: self.config.max_queue_size,
            });
        }

        let task = Task::new(submission.task_type, submission.payload)
            .with_priority(submission.priority.unwrap_or_default())
            .with_timeout_ms(
                submission
                    .timeout_ms
                    .unwrap_or(self.config.default_task_timeout_ms),
            )
            .with_max_retries(
                submission
                    .max_retries
                    .unwrap_or(self.config.default_max_retries),
            );

        tasks.queue.push(task.clone());
        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            priority = ?task.priority,
            "Task queued"
        );
        Ok(task)
    }

    /// Settle one execution report: complete the task, re-queue it while it
    /// has retry budget, or fail it terminally. Reports for tasks that are
    /// not active (already settled, or raced with the timeout sweep) are
    /// dropped.
    pub fn report_task_result(&self, result: TaskResult) {
        let now = Utc::now();

        let outcome = {
            let mut tasks = self.tasks.lock();
            let Some(mut task) = tasks.active.remove(&result.task_id) else {
                drop(tasks);
                tracing::warn!(
                    task_id = %result.task_id,
                    "Result for unknown or already-settled task dropped"
                );
                return;
            };

            if result.success {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(now);
                task.result = result.result.clone();
                tasks.results.insert(task.id.clone(), result.clone());
                ReportOutcome::Completed(task)
            } else if task.retries < task.max_retries {
                task.retries += 1;
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                task.assigned_at = None;
                tasks.queue.push(task.clone());
                ReportOutcome::Requeued(task)
            } else {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                task.error = result.error.clone();
                tasks.results.insert(task.id.clone(), result.clone());
                ReportOutcome::Failed(task)
            }
        };

        if !result.worker_id.is_empty() {
            if result.success {
                self.breakers.record_success(&result.worker_id);
                self.health
                    .record_success(&result.worker_id, result.duration_ms as f64);
            } else {
                self.breakers.record_failure(&result.worker_id);
                self.health.record_failure(&result.worker_id);
            }
        }

        match outcome {
            ReportOutcome::Completed(task) => {
                tracing::info!(task_id = %task.id, worker_id = %result.worker_id, "Task completed");
                self.notify("on_task_completed", |o| o.on_task_completed(&result));
            }
            ReportOutcome::Requeued(task) => {
                tracing::info!(
                    task_id = %task.id,
                    retries = task.retries,
                    max_retries = task.max_retries,
                    "Task failed, re-queued for retry"
                );
            }
            ReportOutcome::Failed(task) => {
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Task failed".to_string());
                tracing::warn!(task_id = %task.id, error = %error, "Task failed terminally");
                self.notify("on_task_failed", |o| o.on_task_failed(&task, &error));
            }
        }
    }

    /// One assignment cycle: reclaim overdue tasks, then route pending ones.
    pub async fn run_assignment_tick(&self) {
        self.sweep_timeouts();
        self.assign_pending().await;
    }

    /// Flip silent workers offline and emit events for them.
    pub async fn run_liveness_tick(&self) {
        for worker in self.registry.check_worker_health().await {
            self.health.mark_down(&worker.id);
            self.notify("on_worker_offline", |o| o.on_worker_offline(&worker));
        }
    }

    /// Look up a task in the active table, then the queue.
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.lock();
        tasks
            .active
            .get(task_id)
            .cloned()
            .or_else(|| tasks.queue.get(task_id).cloned())
    }

    /// Terminal result for a task, if it has settled.
    pub fn get_task_result(&self, task_id: &str) -> Option<TaskResult> {
        self.tasks.lock().results.get(task_id).cloned()
    }

    /// Snapshot of the pending queue in dispatch order.
    pub fn pending_tasks(&self) -> Vec<Task> {
        self.tasks.lock().queue.pending()
    }

    /// Fleet and task-table counters.
    pub async fn stats(&self) -> SupervisorStats {
        let workers = self.registry.stats().await;
        let tasks = {
            let tasks = self.tasks.lock();
            let completed = tasks.results.values().filter(|r| r.success).count();
            TaskStats {
                queued: tasks.queue.len(),
                active: tasks.active.len(),
                completed,
                failed: tasks.results.len() - completed,
            }
        };

        SupervisorStats { workers, tasks }
    }

    /// Advisory health score per registered worker.
    pub async fn worker_health(&self) -> HashMap<String, f64> {
        self.registry
            .get_all()
            .await
            .into_iter()
            .map(|w| {
                let score = self.health.score(&w.id, w.current_load, w.max_load);
                (w.id, score)
            })
            .collect()
    }

    /// Synthesize failure results for active tasks past their deadline and
    /// push them through the normal report path, so the retry policy applies
    /// to timeouts and worker-reported failures uniformly.
    fn sweep_timeouts(&self) {
        let now = Utc::now();
        let expired: Vec<TaskResult> = {
            let tasks = self.tasks.lock();
            tasks
                .active
                .values()
                .filter_map(|task| {
                    let assigned_at = task.assigned_at?;
                    let elapsed = (now - assigned_at).num_milliseconds();
                    (elapsed > task.timeout_ms as i64).then(|| TaskResult {
                        task_id: task.id.clone(),
                        worker_id: task.assigned_to.clone().unwrap_or_default(),
                        success: false,
                        result: None,
                        error: Some("Task timed out".to_string()),
                        duration_ms: elapsed.max(0) as u64,
                    })
                })
                .collect()
        };

        for result in expired {
            tracing::warn!(
                task_id = %result.task_id,
                worker_id = %result.worker_id,
                duration_ms = result.duration_ms,
                "Task exceeded its deadline"
            );
            self.report_task_result(result);
        }
    }

    async fn assign_pending(&self) {
        let pending = { self.tasks.lock().queue.pending() };
        if pending.is_empty() {
            return;
        }

        let available = self.registry.get_available().await;
        let pool: Vec<Worker> = available
            .into_iter()
            .filter(|w| self.breakers.is_available(&w.id))
            .collect();
        if pool.is_empty() {
            tracing::debug!(pending = pending.len(), "No routable workers this tick");
            return;
        }

        for task in pending {
            let Some(worker) = self.router.select(&task, &pool) else {
                continue;
            };

            // Re-check under the lock: the task may have been settled since
            // the snapshot was taken.
            let assigned = {
                let mut tasks = self.tasks.lock();
                tasks.queue.remove(&task.id).map(|mut task| {
                    task.status = TaskStatus::Assigned;
                    task.assigned_to = Some(worker.id.clone());
                    task.assigned_at = Some(Utc::now());
                    tasks.active.insert(task.id.clone(), task.clone());
                    task
                })
            };

            if let Some(task) = assigned {
                tracing::info!(task_id = %task.id, worker_id = %worker.id, "Task assigned");
                self.notify("on_task_assigned", |o| o.on_task_assigned(&task, &worker));
            }
        }
    }

    fn notify(&self, handler: &str, f: impl Fn(&dyn OrchestratorEvents)) {
        for observer in self.observers.read().iter() {
            events::emit(handler, || f(observer.as_ref()));
        }
    }
}
