//! Core data model: workers, tasks, results, fleet statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default capacity for workers that register without a `maxLoad`.
pub const DEFAULT_MAX_LOAD: u32 = 10;

/// Worker liveness/availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Accepting work.
    Online,
    /// Working but may still have headroom.
    Busy,
    /// Self-reported unhealthy; excluded from routing.
    Degraded,
    /// Missed too many heartbeats.
    Offline,
}

/// A registered worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Client-chosen opaque ID, unique within the registry.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Base URL where the worker receives dispatched tasks.
    pub endpoint: String,
    /// Capability tags; an empty set means the worker accepts any task type.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Maximum concurrent tasks the worker advertises.
    pub max_load: u32,
    /// Opaque key/value data supplied at registration.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Current status.
    pub status: WorkerStatus,
    /// Worker-reported number of in-flight tasks.
    pub current_load: u32,
    /// When the worker last checked in.
    pub last_heartbeat: DateTime<Utc>,
}

impl Worker {
    /// Create a worker record with default capacity and no capabilities.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            capabilities: Vec::new(),
            max_load: DEFAULT_MAX_LOAD,
            metadata: HashMap::new(),
            status: WorkerStatus::Online,
            current_load: 0,
            last_heartbeat: Utc::now(),
        }
    }

    /// Set the capability set.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the advertised capacity.
    pub fn with_max_load(mut self, max_load: u32) -> Self {
        self.max_load = max_load;
        self
    }

    /// Set the reported load.
    pub fn with_current_load(mut self, current_load: u32) -> Self {
        self.current_load = current_load;
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check whether the worker explicitly lists a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// An empty capability set accepts any task type.
    pub fn accepts_any_type(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Check whether the worker can take on more work.
    pub fn has_headroom(&self) -> bool {
        self.current_load < self.max_load
    }

    /// Online or busy with headroom: eligible for new assignments.
    pub fn is_available(&self) -> bool {
        matches!(self.status, WorkerStatus::Online | WorkerStatus::Busy) && self.has_headroom()
    }
}

/// Periodic check-in sent by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    /// Worker sending the heartbeat.
    pub worker_id: String,
    /// Self-reported status.
    pub status: WorkerStatus,
    /// Current in-flight task count.
    pub current_load: u32,
    /// Advertised capacity.
    pub max_load: u32,
    /// Updated capability set, if the worker advertises one.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

/// Scheduling priority. Lower rank is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl TaskPriority {
    /// Numeric rank used for queue ordering (critical first).
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue.
    Pending,
    /// Routed to a worker.
    Assigned,
    /// Reported in-progress by the worker.
    Running,
    /// Finished successfully.
    Completed,
    /// Terminally failed (retries exhausted).
    Failed,
    /// Deadline exceeded; settled through the failure path.
    Timeout,
}

/// A typed unit of work submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-minted unique ID.
    pub id: String,
    /// Task type; matched against worker capabilities.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque payload forwarded to the executing worker.
    pub payload: serde_json::Value,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Deadline measured from assignment.
    pub timeout_ms: u64,
    /// How many times a failed run may be re-queued.
    pub max_retries: u32,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Failed runs so far.
    pub retries: u32,
    /// Worker the task is assigned to, while assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// When the current assignment was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Terminal error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a pending task with a fresh ID.
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            payload,
            priority: TaskPriority::default(),
            timeout_ms: 0,
            max_retries: 0,
            status: TaskStatus::Pending,
            retries: 0,
            assigned_to: None,
            assigned_at: None,
            completed_at: None,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the execution deadline.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Client-facing task submission; omitted fields fall back to configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSubmission {
    /// Task type; matched against worker capabilities.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// Scheduling priority (default: normal).
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    /// Deadline override.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Retry budget override.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Terminal outcome of one task execution, as reported by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Task the result belongs to.
    pub task_id: String,
    /// Worker that executed the task.
    pub worker_id: String,
    /// Whether execution succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: u64,
}

/// Fleet membership counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub online: usize,
    pub busy: usize,
    pub degraded: usize,
    pub offline: usize,
    /// Sum of advertised capacities.
    pub total_capacity: u64,
    /// Sum of reported loads.
    pub total_load: u64,
}

/// Task table counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Combined snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStats {
    pub workers: RegistryStats,
    pub tasks: TaskStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_builder() {
        let worker = Worker::new("w1", "Worker One", "http://localhost:9001")
            .with_capabilities(vec!["chat".into(), "code".into()])
            .with_max_load(4);

        assert_eq!(worker.id, "w1");
        assert_eq!(worker.max_load, 4);
        assert!(worker.has_capability("chat"));
        assert!(!worker.has_capability("vision"));
        assert!(!worker.accepts_any_type());
        assert!(worker.is_available());
    }

    #[test]
    fn test_worker_availability() {
        let mut worker = Worker::new("w1", "Worker", "http://localhost").with_max_load(2);
        assert!(worker.is_available());

        worker.current_load = 2;
        assert!(!worker.is_available());

        worker.current_load = 1;
        worker.status = WorkerStatus::Busy;
        assert!(worker.is_available());

        worker.status = WorkerStatus::Degraded;
        assert!(!worker.is_available());
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(TaskPriority::Critical.rank() < TaskPriority::High.rank());
        assert!(TaskPriority::High.rank() < TaskPriority::Normal.rank());
        assert!(TaskPriority::Normal.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("chat", serde_json::json!({"msg": "hi"}))
            .with_priority(TaskPriority::High)
            .with_timeout_ms(5000)
            .with_max_retries(2);

        assert_eq!(task.task_type, "chat");
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, 0);
        assert!(task.assigned_to.is_none());
    }

    #[test]
    fn test_task_wire_format() {
        let task = Task::new("chat", serde_json::Value::Null);
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["type"], "chat");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "normal");
        assert!(json.get("assignedTo").is_none());
        assert!(json.get("maxRetries").is_some());
    }
}
