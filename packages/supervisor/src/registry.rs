//! Worker registry.
//!
//! Single source of truth for fleet membership. Liveness is derived from
//! heartbeat timestamps: a worker that stays silent past the allowed window
//! is flipped to offline but kept in the table until explicitly unregistered.

use crate::types::{HeartbeatPayload, RegistryStats, Worker, WorkerStatus};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory worker table.
pub struct WorkerRegistry {
    workers: Arc<RwLock<HashMap<String, Worker>>>,
    heartbeat_interval_ms: u64,
    missed_threshold: u32,
}

impl WorkerRegistry {
    pub fn new(heartbeat_interval_ms: u64, missed_threshold: u32) -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            heartbeat_interval_ms,
            missed_threshold,
        }
    }

    /// Register a worker. Re-registering an existing id refreshes its
    /// descriptor fields, merges metadata, and brings it back online.
    pub async fn register(&self, worker: Worker) -> Worker {
        let mut workers = self.workers.write().await;

        let stored = match workers.get_mut(&worker.id) {
            Some(existing) => {
                existing.name = worker.name;
                existing.endpoint = worker.endpoint;
                existing.capabilities = worker.capabilities;
                existing.max_load = worker.max_load;
                existing.metadata.extend(worker.metadata);
                existing.current_load = worker.current_load;
                existing.status = WorkerStatus::Online;
                existing.last_heartbeat = Utc::now();
                existing.clone()
            }
            None => {
                let mut worker = worker;
                worker.status = WorkerStatus::Online;
                worker.last_heartbeat = Utc::now();
                workers.insert(worker.id.clone(), worker.clone());
                worker
            }
        };

        tracing::info!(worker_id = %stored.id, name = %stored.name, "Worker registered");
        stored
    }

    /// Remove a worker. Returns whether it existed.
    pub async fn unregister(&self, worker_id: &str) -> bool {
        let removed = self.workers.write().await.remove(worker_id).is_some();
        if removed {
            tracing::info!(worker_id = %worker_id, "Worker unregistered");
        }
        removed
    }

    /// Apply a heartbeat. Unknown ids are ignored. Returns the updated
    /// worker together with its status before the update.
    pub async fn heartbeat(&self, payload: HeartbeatPayload) -> Option<(Worker, WorkerStatus)> {
        let mut workers = self.workers.write().await;

        let Some(worker) = workers.get_mut(&payload.worker_id) else {
            tracing::debug!(worker_id = %payload.worker_id, "Heartbeat from unknown worker ignored");
            return None;
        };

        let previous = worker.status;
        worker.status = payload.status;
        worker.current_load = payload.current_load;
        worker.max_load = payload.max_load;
        if let Some(capabilities) = payload.capabilities {
            worker.capabilities = capabilities;
        }
        worker.last_heartbeat = Utc::now();

        Some((worker.clone(), previous))
    }

    /// Flip workers that missed too many heartbeats to offline. Returns the
    /// newly offline workers so the caller can emit events.
    pub async fn check_worker_health(&self) -> Vec<Worker> {
        let allowed_silence =
            Duration::milliseconds((self.heartbeat_interval_ms * u64::from(self.missed_threshold)) as i64);
        let now = Utc::now();

        let mut workers = self.workers.write().await;
        let mut went_offline = Vec::new();

        for worker in workers.values_mut() {
            if worker.status == WorkerStatus::Offline {
                continue;
            }
            if now - worker.last_heartbeat > allowed_silence {
                worker.status = WorkerStatus::Offline;
                tracing::warn!(
                    worker_id = %worker.id,
                    last_heartbeat = %worker.last_heartbeat,
                    "Worker missed heartbeats, marking offline"
                );
                went_offline.push(worker.clone());
            }
        }

        went_offline
    }

    /// Get a worker by id.
    pub async fn get(&self, worker_id: &str) -> Option<Worker> {
        self.workers.read().await.get(worker_id).cloned()
    }

    /// All registered workers.
    pub async fn get_all(&self) -> Vec<Worker> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Workers in a given status.
    pub async fn get_by_status(&self, status: WorkerStatus) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect()
    }

    /// Online workers that explicitly list a capability.
    pub async fn get_by_capability(&self, capability: &str) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkerStatus::Online && w.has_capability(capability))
            .cloned()
            .collect()
    }

    /// Workers eligible for new assignments: online or busy, with headroom.
    pub async fn get_available(&self) -> Vec<Worker> {
        self.workers
            .read()
            .await
            .values()
            .filter(|w| w.is_available())
            .cloned()
            .collect()
    }

    /// Number of registered workers.
    pub async fn count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Fleet counters.
    pub async fn stats(&self) -> RegistryStats {
        let workers = self.workers.read().await;
        let mut stats = RegistryStats {
            total: workers.len(),
            ..RegistryStats::default()
        };

        for worker in workers.values() {
            match worker.status {
                WorkerStatus::Online => stats.online += 1,
                WorkerStatus::Busy => stats.busy += 1,
                WorkerStatus::Degraded => stats.degraded += 1,
                WorkerStatus::Offline => stats.offline += 1,
            }
            stats.total_capacity += u64::from(worker.max_load);
            stats.total_load += u64::from(worker.current_load);
        }

        stats
    }
}
