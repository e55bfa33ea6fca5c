//! Background worker for one enrichment task

use super::{ProgressObserver, TaskManagerConfig, TaskRegistry};
use crate::error::EnrichError;
use crate::models::{EnrichedItem, SourceItem, Task};
use crate::services::enrichment_client::ItemOutcome;
use crate::services::input::{needs_translation, parse_input};
use crate::services::{BatchPlanner, EnrichmentClient, WordCollection};
use crate::utils::sleep_or_cancel;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why the worker stopped before completing
enum Halt {
    Cancelled,
    Failed {
        error: String,
        /// Source text of items not yet accounted for
        unaccounted: Vec<String>,
    },
}

impl Halt {
    fn from_error(err: EnrichError, unaccounted: Vec<String>) -> Self {
        match err {
            EnrichError::Cancelled => Halt::Cancelled,
            other => Halt::Failed {
                error: other.to_string(),
                unaccounted,
            },
        }
    }
}

/// Marks the worker as exited when dropped, including on panic
struct DoneGuard(watch::Sender<bool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

fn texts(items: &[SourceItem]) -> Vec<String> {
    items.iter().map(|item| item.text.clone()).collect()
}

pub(super) struct Worker {
    pub(super) task_id: Uuid,
    pub(super) registry: TaskRegistry,
    pub(super) client: Arc<EnrichmentClient>,
    pub(super) collection: Arc<dyn WordCollection>,
    pub(super) observer: Arc<dyn ProgressObserver>,
    pub(super) config: TaskManagerConfig,
    pub(super) cancel: CancellationToken,
}

impl Worker {
    pub(super) async fn run(self, raw: String, done: watch::Sender<bool>) {
        let _done = DoneGuard(done);
        let start_time = Instant::now();

        if self.cancel.is_cancelled() {
            self.halt_cancelled();
            return;
        }

        self.commit(Task::mark_running);
        info!(task_id = %self.task_id, "Enrichment task running");

        match self.execute(&raw).await {
            Ok(()) => {
                let task = self.commit(|t| {
                    let summary = format!(
                        "Completed: {} added, {} skipped, {} failed",
                        t.added, t.skipped, t.failed
                    );
                    t.mark_completed(summary);
                });
                if let Some(task) = task {
                    info!(
                        task_id = %self.task_id,
                        added = task.added,
                        skipped = task.skipped,
                        failed = task.failed,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Enrichment task completed"
                    );
                }
            }
            Err(Halt::Cancelled) => self.halt_cancelled(),
            Err(Halt::Failed { error, unaccounted }) => {
                error!(
                    task_id = %self.task_id,
                    error = %error,
                    unaccounted = unaccounted.len(),
                    "Enrichment task failed"
                );
                self.commit(|t| t.mark_failed(error, &unaccounted));
            }
        }
    }

    async fn execute(&self, raw: &str) -> Result<(), Halt> {
        let parsed = parse_input(raw);
        let mut items = parsed.items;

        if items.is_empty() {
            return Err(Halt::Failed {
                error: "no source items after cleaning".to_string(),
                unaccounted: Vec::new(),
            });
        }

        let total = items.len();
        if let Some(task) = self.registry.update(self.task_id, |t| {
            t.total_items = total;
            t.current_operation = format!("Parsed {} item(s)", total);
        }) {
            self.observer.on_started(self.task_id, &task);
        }
        debug!(task_id = %self.task_id, total, structured = parsed.structured, "Input parsed");

        self.client
            .check_configuration()
            .map_err(|e| Halt::from_error(e, texts(&items)))?;

        if needs_translation(&items, self.config.expected_script) {
            items = self.translate(items).await?;
        }

        let planner = BatchPlanner::new(self.config.batch_size);
        let plan = planner.plan(&items, &self.collection.existing_keys());

        self.commit(|t| {
            t.record_skipped(plan.skipped_count);
            t.current_operation = format!(
                "Planned {} batch(es), {} duplicate(s) skipped",
                plan.batches.len(),
                plan.skipped_count
            );
        });

        if plan.is_empty() {
            info!(task_id = %self.task_id, skipped = plan.skipped_count, "Nothing new to enrich");
            return Ok(());
        }

        let batch_count = plan.batches.len();
        for (index, batch) in plan.batches.iter().enumerate() {
            if index > 0 {
                let delay = self.config.throttle.delay_after(index - 1);
                sleep_or_cancel(delay, &self.cancel)
                    .await
                    .map_err(|_| Halt::Cancelled)?;
            }

            if self.cancel.is_cancelled() {
                return Err(Halt::Cancelled);
            }

            let operation = format!("Enriching batch {}/{}", index + 1, batch_count);
            self.commit(|t| t.current_operation = operation.clone());

            match self.client.enrich(batch, &self.cancel).await {
                Ok(outcomes) => self.merge_batch(index, batch.len(), outcomes, &operation),
                Err(EnrichError::Cancelled) => return Err(Halt::Cancelled),
                Err(err) if err.is_fatal() => {
                    let unaccounted = plan.batches[index..].iter().flat_map(|b| texts(b)).collect();
                    return Err(Halt::from_error(err, unaccounted));
                }
                Err(err) => {
                    warn!(
                        task_id = %self.task_id,
                        batch = index,
                        items = batch.len(),
                        error = %err,
                        "Batch failed; counting its items as failed"
                    );
                    let failed = texts(batch);
                    self.commit(|t| {
                        t.record_failures(&failed);
                        t.record_batch_attempted(batch.len(), format!("{} failed: {}", operation, err));
                    });
                }
            }
        }

        Ok(())
    }

    /// Translation pre-pass; translated text becomes the source, the original its meaning
    async fn translate(&self, items: Vec<SourceItem>) -> Result<Vec<SourceItem>, Halt> {
        info!(
            task_id = %self.task_id,
            items = items.len(),
            expected_script = %self.config.expected_script,
            "Input script differs from backend script; translating first"
        );
        self.commit(|t| t.current_operation = format!("Translating {} item(s)", items.len()));

        let translations = self
            .client
            .translate(&items, &self.cancel)
            .await
            .map_err(|e| Halt::from_error(e, texts(&items)))?;

        Ok(items
            .into_iter()
            .zip(translations)
            .map(|(item, translated)| SourceItem {
                translation: item.translation.or(Some(item.text)),
                text: translated,
            })
            .collect())
    }

    fn merge_batch(&self, index: usize, batch_len: usize, outcomes: Vec<ItemOutcome>, operation: &str) {
        let mut enriched: Vec<EnrichedItem> = Vec::with_capacity(outcomes.len());
        let mut failed: Vec<String> = Vec::new();

        for outcome in outcomes {
            match outcome {
                ItemOutcome::Enriched(item) => enriched.push(item),
                ItemOutcome::Failed { source, reason } => {
                    debug!(task_id = %self.task_id, batch = index, source = %source, reason = %reason, "Item rejected");
                    failed.push(source);
                }
            }
        }

        let added = self.collection.merge(enriched);
        debug!(task_id = %self.task_id, batch = index, added, failed = failed.len(), "Batch merged");

        self.commit(|t| {
            t.record_added(added);
            t.record_failures(&failed);
            t.record_batch_attempted(batch_len, operation);
        });
    }

    fn halt_cancelled(&self) {
        info!(task_id = %self.task_id, "Cancellation observed; worker halting");
        self.commit(Task::mark_cancelled);
    }

    /// Apply an update and notify the observer with the resulting snapshot
    fn commit(&self, f: impl FnOnce(&mut Task)) -> Option<Task> {
        let task = self.registry.update(self.task_id, f)?;
        self.observer.on_progress(self.task_id, &task);
        Some(task)
    }
}
