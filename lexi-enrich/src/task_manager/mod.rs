//! Enrichment task manager
//!
//! Owns the task registry and spawns one background worker per task.
//!
//! **State machine:** `Pending → Running → {Completed | Failed}`.
//! Cancellation is an annotation (`cancel_requested`, `cancelled_at`) on a
//! task whose status stays where the worker left it.
//!
//! **Registry:** every mutation is a closure applied under one write lock,
//! so `query` and `list` always return whole snapshots.

pub mod observer;
mod worker;

pub use observer::{task_event, NoopObserver, ProgressObserver};

use crate::models::{Task, TaskSummary, ThrottlePolicy};
use crate::services::input::Script;
use crate::services::{EnrichmentClient, WordCollection, DEFAULT_BATCH_SIZE};
use lexi_common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use worker::Worker;

/// Worker settings shared by every task
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Source items per backend call
    pub batch_size: usize,
    /// Inter-batch delay schedule
    pub throttle: ThrottlePolicy,
    /// Script the backend expects source words in; other scripts are translated first
    pub expected_script: Script,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            throttle: ThrottlePolicy::default(),
            expected_script: Script::Latin,
        }
    }
}

struct TaskEntry {
    task: Task,
    cancel: CancellationToken,
    /// Flips to `true` when the worker exits (normally or by panic)
    worker_done: watch::Receiver<bool>,
}

type Registry = Arc<RwLock<HashMap<Uuid, TaskEntry>>>;

/// Shared handle to the registry used by the manager and its workers
#[derive(Clone)]
struct TaskRegistry {
    tasks: Registry,
}

impl TaskRegistry {
    /// Apply `f` to the task under one write lock and return the new snapshot
    fn update(&self, id: Uuid, f: impl FnOnce(&mut Task)) -> Option<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.get_mut(&id).map(|entry| {
            f(&mut entry.task);
            entry.task.clone()
        })
    }
}

/// Enrichment task manager
pub struct TaskManager {
    registry: TaskRegistry,
    client: Arc<EnrichmentClient>,
    collection: Arc<dyn WordCollection>,
    observer: Arc<dyn ProgressObserver>,
    config: TaskManagerConfig,
}

impl TaskManager {
    pub fn new(
        client: Arc<EnrichmentClient>,
        collection: Arc<dyn WordCollection>,
        observer: Arc<dyn ProgressObserver>,
        config: TaskManagerConfig,
    ) -> Self {
        Self {
            registry: TaskRegistry {
                tasks: Arc::new(RwLock::new(HashMap::new())),
            },
            client,
            collection,
            observer,
            config,
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    /// Register a task for `raw` and start its worker
    ///
    /// Returns immediately with the task id. Everything that can go wrong
    /// with the content of `raw` is reported on the task, not here; the only
    /// synchronous errors are a blank submission and a missing Tokio runtime.
    pub fn start(&self, raw: &str) -> Result<Uuid> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidInput("submission is empty".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Internal(format!("no Tokio runtime to run the task on: {}", e)))?;

        let task = Task::new();
        let task_id = task.id;
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        {
            let mut tasks = self.registry.tasks.write().unwrap_or_else(PoisonError::into_inner);
            tasks.insert(
                task_id,
                TaskEntry {
                    task,
                    cancel: cancel.clone(),
                    worker_done: done_rx,
                },
            );
        }

        tracing::info!(task_id = %task_id, input_bytes = raw.len(), "Enrichment task registered");

        let worker = Worker {
            task_id,
            registry: self.registry.clone(),
            client: Arc::clone(&self.client),
            collection: Arc::clone(&self.collection),
            observer: Arc::clone(&self.observer),
            config: self.config.clone(),
            cancel,
        };
        runtime.spawn(worker.run(raw.to_string(), done_tx));

        Ok(task_id)
    }

    /// Request cancellation
    ///
    /// Idempotent, and a no-op for terminal tasks. Returns whether the task
    /// exists.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let mut tasks = self.registry.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = tasks.get_mut(&task_id) else {
            return false;
        };

        if !entry.task.is_terminal() && !entry.task.cancel_requested {
            entry.task.cancel_requested = true;
            entry.cancel.cancel();
            tracing::info!(task_id = %task_id, status = entry.task.status.as_str(), "Cancellation requested");
        }
        true
    }

    /// Snapshot of one task
    pub fn query(&self, task_id: Uuid) -> Option<Task> {
        let tasks = self.registry.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks.get(&task_id).map(|entry| entry.task.clone())
    }

    /// Summaries of all tasks, newest first
    pub fn list(&self) -> Vec<TaskSummary> {
        let tasks = self.registry.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<TaskSummary> = tasks.values().map(|entry| entry.task.summary()).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Remove finished tasks; returns how many were removed
    ///
    /// Finished means `Completed`/`Failed`, or halted after cancellation
    /// with the worker gone.
    pub fn clear_completed(&self) -> usize {
        let mut tasks = self.registry.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, entry| {
            let halted = entry.task.is_cancelled() && *entry.worker_done.borrow();
            !(entry.task.is_terminal() || halted)
        });
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = tasks.len(), "Cleared finished tasks");
        }
        removed
    }

    /// Wait until the task's worker has exited and return the final snapshot
    pub async fn wait(&self, task_id: Uuid) -> Option<Task> {
        let mut done = {
            let tasks = self.registry.tasks.read().unwrap_or_else(PoisonError::into_inner);
            tasks.get(&task_id)?.worker_done.clone()
        };

        // A closed channel means the worker is gone as well
        let _ = done.wait_for(|finished| *finished).await;
        self.query(task_id)
    }
}
