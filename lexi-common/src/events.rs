//! Event types for the Lexi event system
//!
//! Provides the shared event definitions and the EventBus the enrichment
//! pipeline publishes task progress on. The UI layer subscribes and renders;
//! nothing here knows about a concrete rendering framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Point-in-time counters for one enrichment task
///
/// Mirrors the task record so subscribers never need to query back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgressData {
    /// Task status name ("PENDING", "RUNNING", "COMPLETED", "FAILED")
    pub status: String,
    /// Percentage complete (0-100)
    pub progress: u8,
    /// Source items after cleaning
    pub total_items: usize,
    /// Source items accounted for so far
    pub processed_items: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Current operation description
    pub current_operation: String,
}

/// Lexi event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LexiEvent {
    /// Worker picked the task up (Pending → Running)
    TaskStarted {
        task_id: Uuid,
        total_items: usize,
        timestamp: DateTime<Utc>,
    },

    /// Counters changed (batch merged, batch failed, pre-pass finished)
    TaskProgress {
        task_id: Uuid,
        data: TaskProgressData,
        timestamp: DateTime<Utc>,
    },

    /// All batches attempted
    TaskCompleted {
        task_id: Uuid,
        data: TaskProgressData,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Task-wide failure
    TaskFailed {
        task_id: Uuid,
        data: TaskProgressData,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Worker observed cancellation and halted
    TaskCancelled {
        task_id: Uuid,
        data: TaskProgressData,
        timestamp: DateTime<Utc>,
    },
}

impl LexiEvent {
    /// Task this event refers to
    pub fn task_id(&self) -> Uuid {
        match self {
            LexiEvent::TaskStarted { task_id, .. }
            | LexiEvent::TaskProgress { task_id, .. }
            | LexiEvent::TaskCompleted { task_id, .. }
            | LexiEvent::TaskFailed { task_id, .. }
            | LexiEvent::TaskCancelled { task_id, .. } => *task_id,
        }
    }

    /// True for the last event a task emits
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            LexiEvent::TaskCompleted { .. }
                | LexiEvent::TaskFailed { .. }
                | LexiEvent::TaskCancelled { .. }
        )
    }
}

/// Event distribution bus
///
/// Uses tokio::broadcast internally: publishing never blocks on slow
/// subscribers, and lagging subscribers observe `RecvError::Lagged`.
///
/// # Examples
///
/// ```
/// use lexi_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LexiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LexiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LexiEvent) -> Result<usize, broadcast::error::SendError<LexiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LexiEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> TaskProgressData {
        TaskProgressData {
            status: "RUNNING".to_string(),
            progress: 40,
            total_items: 10,
            processed_items: 4,
            added: 3,
            skipped: 1,
            failed: 0,
            current_operation: "Batch 1 of 2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let task_id = Uuid::new_v4();

        bus.emit(LexiEvent::TaskProgress {
            task_id,
            data: sample_data(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id(), task_id);
        assert!(!event.is_final());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        let event = LexiEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            total_items: 3,
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        // Lossy emit must not panic either way
        bus.emit_lossy(event);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LexiEvent::TaskFailed {
            task_id: Uuid::nil(),
            data: sample_data(),
            error: "Backend rejected credentials".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TaskFailed");
        assert_eq!(json["data"]["added"], 3);
        assert!(event.is_final());
    }
}
