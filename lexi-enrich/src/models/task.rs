//! Enrichment task state machine
//!
//! A task progresses `Pending → Running → {Completed | Failed}`. Cancellation is
//! not a status: the worker halts, stamps `cancelled_at`, and the task keeps
//! whatever status it had.

use chrono::{DateTime, Utc};
use lexi_common::events::TaskProgressData;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Registered, worker not yet running
    Pending,
    /// Worker is processing batches
    Running,
    /// Every batch attempted
    Completed,
    /// Task-wide failure
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

/// How a finished task should be reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Everything new was added
    Success,
    /// Some items added, some failed
    PartialSuccess,
    /// Nothing added, at least one failure
    Failure,
    /// Nothing to do (all duplicates)
    Informational,
}

/// One background enrichment job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    /// Percentage complete (0-100); 100 only together with `Completed`
    pub progress: u8,
    /// Source items after cleaning (duplicates included)
    pub total_items: usize,
    /// Source items accounted for (skipped + attempted)
    pub processed_items: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Source strings that could not be enriched, in encounter order
    pub failed_items: Vec<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when the worker observed cancellation and stopped
    pub cancelled_at: Option<DateTime<Utc>>,
    pub current_operation: String,
    /// Failure description, only in `Failed`
    pub error: Option<String>,
}

/// Compact list-view row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub total_items: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create new pending task
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            progress: 0,
            total_items: 0,
            processed_items: 0,
            added: 0,
            skipped: 0,
            failed: 0,
            failed_items: Vec::new(),
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            cancelled_at: None,
            current_operation: String::from("Waiting to start..."),
            error: None,
        }
    }

    /// Pending → Running
    pub fn mark_running(&mut self) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Running → Completed, progress set to 100 in the same update
    pub fn mark_completed(&mut self, operation: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.processed_items = self.total_items;
        self.current_operation = operation.into();
        self.ended_at = Some(Utc::now());
    }

    /// → Failed
    ///
    /// Items not yet accounted for are counted as failed so the counters add up
    /// to `total_items`.
    pub fn mark_failed(&mut self, error: impl Into<String>, unaccounted: &[String]) {
        if self.status.is_terminal() {
            return;
        }
        let error = error.into();
        self.record_failures(unaccounted);
        self.status = TaskStatus::Failed;
        self.processed_items = self.total_items;
        self.current_operation = format!("Failed: {}", error);
        self.error = Some(error);
        self.ended_at = Some(Utc::now());
    }

    /// Stamp the cancellation annotation (status untouched)
    pub fn mark_cancelled(&mut self) {
        if self.cancelled_at.is_none() {
            self.cancelled_at = Some(Utc::now());
            self.current_operation = "Cancelled by user".to_string();
        }
    }

    pub fn record_skipped(&mut self, count: usize) {
        self.skipped += count;
        self.processed_items += count;
        self.refresh_progress();
    }

    pub fn record_added(&mut self, count: usize) {
        self.added += count;
    }

    pub fn record_failures(&mut self, sources: &[String]) {
        self.failed += sources.len();
        self.failed_items.extend(sources.iter().cloned());
    }

    /// Account for one attempted batch of `batch_len` items
    pub fn record_batch_attempted(&mut self, batch_len: usize, operation: impl Into<String>) {
        self.processed_items += batch_len;
        self.current_operation = operation.into();
        self.refresh_progress();
    }

    /// Recompute progress from counters; held below 100 until completion
    fn refresh_progress(&mut self) {
        if self.status == TaskStatus::Completed {
            self.progress = 100;
            return;
        }
        let pct = if self.total_items > 0 {
            (self.processed_items.min(self.total_items) * 100) / self.total_items
        } else {
            0
        };
        // Monotonic while running
        self.progress = self.progress.max(pct.min(99) as u8);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Worker stopped after a cancellation request
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// User-facing classification; `None` while the task can still change
    pub fn outcome(&self) -> Option<TaskOutcome> {
        if !self.is_terminal() {
            return None;
        }
        Some(match (self.added, self.failed) {
            (0, 0) => TaskOutcome::Informational,
            (0, _) => TaskOutcome::Failure,
            (_, 0) => TaskOutcome::Success,
            _ => TaskOutcome::PartialSuccess,
        })
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id,
            status: self.status,
            progress: self.progress,
            total_items: self.total_items,
            added: self.added,
            skipped: self.skipped,
            failed: self.failed,
            cancelled: self.is_cancelled(),
            created_at: self.created_at,
        }
    }

    /// Counters in event form
    pub fn progress_data(&self) -> TaskProgressData {
        TaskProgressData {
            status: self.status.as_str().to_string(),
            progress: self.progress,
            total_items: self.total_items,
            processed_items: self.processed_items,
            added: self.added,
            skipped: self.skipped,
            failed: self.failed,
            current_operation: self.current_operation.clone(),
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_task(total: usize) -> Task {
        let mut task = Task::new();
        task.total_items = total;
        task.mark_running();
        task
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.outcome().is_none());
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_progress_never_reaches_100_while_running() {
        let mut task = running_task(4);
        task.record_batch_attempted(4, "Batch 1 of 1");
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 99);

        task.mark_completed("Done");
        assert_eq!(task.progress, 100);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_progress_monotonic() {
        let mut task = running_task(10);
        task.record_skipped(2);
        assert_eq!(task.progress, 20);
        task.record_batch_attempted(5, "Batch 1 of 2");
        assert_eq!(task.progress, 70);
        task.record_batch_attempted(0, "noop");
        assert_eq!(task.progress, 70);
    }

    #[test]
    fn test_failed_accounts_for_remaining_items() {
        let mut task = running_task(5);
        task.record_skipped(1);
        task.record_added(1);
        task.record_batch_attempted(1, "Batch 1 of 2");
        task.mark_failed("Backend rejected credentials", &["c".into(), "d".into(), "e".into()]);

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.added + task.skipped + task.failed, task.total_items);
        assert_eq!(task.failed_items, vec!["c", "d", "e"]);
        assert_eq!(task.error.as_deref(), Some("Backend rejected credentials"));
        assert_ne!(task.progress, 100);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut task = running_task(1);
        task.mark_completed("Done");
        task.mark_failed("late", &[]);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_cancel_leaves_status() {
        let mut task = running_task(3);
        task.mark_cancelled();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.is_cancelled());
        assert!(task.error.is_none());
    }

    #[test]
    fn test_outcomes() {
        let mut task = running_task(3);
        task.record_added(2);
        task.record_failures(&["x".into()]);
        task.mark_completed("Done");
        assert_eq!(task.outcome(), Some(TaskOutcome::PartialSuccess));

        let mut task = running_task(2);
        task.record_skipped(2);
        task.mark_completed("Done");
        assert_eq!(task.outcome(), Some(TaskOutcome::Informational));

        let mut task = running_task(1);
        task.mark_failed("boom", &["a".into()]);
        assert_eq!(task.outcome(), Some(TaskOutcome::Failure));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TaskStatus::Running).unwrap(), "\"RUNNING\"");
        assert_eq!(TaskStatus::Failed.as_str(), "FAILED");
    }
}
