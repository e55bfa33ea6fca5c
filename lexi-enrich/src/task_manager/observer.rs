//! Task progress notification
//!
//! The worker notifies an observer after every committed task update. The
//! observer always receives a full snapshot, never a delta.

use crate::models::{Task, TaskStatus};
use chrono::Utc;
use lexi_common::events::{EventBus, LexiEvent};
use uuid::Uuid;

/// Receives task snapshots from the worker
pub trait ProgressObserver: Send + Sync {
    /// Worker picked the task up and counted its items
    fn on_started(&self, task_id: Uuid, task: &Task) {
        self.on_progress(task_id, task);
    }

    /// Any committed update, including the final one
    fn on_progress(&self, task_id: Uuid, task: &Task);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _task_id: Uuid, _task: &Task) {}
}

impl ProgressObserver for EventBus {
    fn on_started(&self, task_id: Uuid, task: &Task) {
        self.emit_lossy(LexiEvent::TaskStarted {
            task_id,
            total_items: task.total_items,
            timestamp: Utc::now(),
        });
    }

    fn on_progress(&self, task_id: Uuid, task: &Task) {
        self.emit_lossy(task_event(task_id, task));
    }
}

/// Map a task snapshot onto the event subscribers see
pub fn task_event(task_id: Uuid, task: &Task) -> LexiEvent {
    let data = task.progress_data();
    let timestamp = Utc::now();

    match task.status {
        TaskStatus::Completed => LexiEvent::TaskCompleted {
            task_id,
            data,
            duration_ms: task
                .started_at
                .zip(task.ended_at)
                .map(|(start, end)| (end - start).num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            timestamp,
        },
        TaskStatus::Failed => LexiEvent::TaskFailed {
            task_id,
            data,
            error: task.error.clone().unwrap_or_default(),
            timestamp,
        },
        _ if task.is_cancelled() => LexiEvent::TaskCancelled {
            task_id,
            data,
            timestamp,
        },
        _ => LexiEvent::TaskProgress {
            task_id,
            data,
            timestamp,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_mapping() {
        let mut task = Task::new();
        let id = task.id;
        task.mark_running();
        assert!(matches!(task_event(id, &task), LexiEvent::TaskProgress { .. }));

        task.mark_cancelled();
        assert!(matches!(task_event(id, &task), LexiEvent::TaskCancelled { .. }));

        let mut failed = Task::new();
        failed.mark_running();
        failed.mark_failed("HTTP 401", &[]);
        match task_event(failed.id, &failed) {
            LexiEvent::TaskFailed { error, data, .. } => {
                assert_eq!(error, "HTTP 401");
                assert_eq!(data.status, "FAILED");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_bus_observer_broadcasts() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let mut task = Task::new();
        task.mark_running();
        task.total_items = 3;
        bus.on_started(task.id, &task);
        task.mark_completed("done");
        bus.on_progress(task.id, &task);

        match rx.recv().await.unwrap() {
            LexiEvent::TaskStarted { total_items, .. } => assert_eq!(total_items, 3),
            other => panic!("unexpected event {:?}", other),
        }
        let last = rx.recv().await.unwrap();
        assert!(last.is_final());
        assert_eq!(last.task_id(), task.id);
    }
}
