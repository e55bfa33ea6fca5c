//! Batch planning
//!
//! Deduplicates cleaned source items against the existing collection and
//! against themselves, then cuts the remainder into fixed-size batches.
//! Pure and deterministic: same input, same plan.

use crate::models::SourceItem;
use std::collections::HashSet;

/// Default number of source items per backend call
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Result of planning one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// Ordered batches of unique, new items
    pub batches: Vec<Vec<SourceItem>>,
    /// Number of items dropped as duplicates
    pub skipped_count: usize,
    /// The dropped items' source text, in encounter order
    pub skipped_items: Vec<String>,
}

impl BatchPlan {
    /// Number of items that will be sent to the backend
    pub fn planned_items(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Nothing left to enrich
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Batch planner service
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    batch_size: usize,
}

impl BatchPlanner {
    /// Create planner; a batch size of 0 is treated as 1
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Plan batches for `items`
    ///
    /// # Arguments
    /// * `items` - Cleaned source items in input order
    /// * `existing` - Canonical keys already present in the collection
    ///
    /// Exact canonical-key equality decides duplicates; the first occurrence
    /// of a repeated item wins. Relative order is preserved and only the last
    /// batch may be short.
    pub fn plan<S: AsRef<str>>(&self, items: &[SourceItem], existing: &[S]) -> BatchPlan {
        let keys: Vec<String> = items.iter().map(SourceItem::canonical_key).collect();
        let mut seen: HashSet<&str> = existing.iter().map(|s| AsRef::<str>::as_ref(s)).collect();

        let mut fresh = Vec::with_capacity(items.len());
        let mut skipped_items = Vec::new();

        for (item, key) in items.iter().zip(keys.iter()) {
            if seen.insert(key.as_str()) {
                fresh.push(item.clone());
            } else {
                skipped_items.push(item.text.clone());
            }
        }

        let batches: Vec<Vec<SourceItem>> = fresh
            .chunks(self.batch_size)
            .map(<[SourceItem]>::to_vec)
            .collect();

        tracing::debug!(
            input = items.len(),
            unique = fresh.len(),
            skipped = skipped_items.len(),
            batches = batches.len(),
            batch_size = self.batch_size,
            "Planned enrichment batches"
        );

        BatchPlan {
            batches,
            skipped_count: skipped_items.len(),
            skipped_items,
        }
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
