//! Word collection and merge
//!
//! The pipeline only ever appends to the collection: one merge per batch,
//! applied under a single write lock so readers never observe half a batch.

use crate::models::{pair_key, EnrichedItem, WordCategory};
use chrono::{DateTime, Utc};
use lexi_common::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Store key the collection is persisted under
pub const COLLECTION_STORE_KEY: &str = "word_collection";

/// Collection the pipeline deduplicates against and merges into
pub trait WordCollection: Send + Sync {
    /// Canonical keys of every stored word
    fn existing_keys(&self) -> Vec<String>;

    /// Append `items` atomically; returns how many were added
    fn merge(&self, items: Vec<EnrichedItem>) -> usize;
}

/// Stored word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEntry {
    pub id: Uuid,
    pub item: EnrichedItem,
    pub added_at: DateTime<Utc>,
}

impl WordEntry {
    pub fn new(item: EnrichedItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            added_at: Utc::now(),
        }
    }

    /// Keys under which this entry counts as already present
    ///
    /// A plain resubmission of the source text matches, and so does a pair
    /// submission carrying the same translation (a pair's translation is
    /// always the one stored).
    pub fn keys(&self) -> [String; 2] {
        [
            self.item.source.clone(),
            pair_key(&self.item.source, &self.item.translation),
        ]
    }
}

/// Collection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub total: usize,
    /// Count per category label ("noun", "verb", ...)
    pub by_category: BTreeMap<&'static str, usize>,
    pub verbs_with_conjugations: usize,
    pub with_examples: usize,
}

fn category_label(category: &WordCategory) -> &'static str {
    match category {
        WordCategory::Noun => "noun",
        WordCategory::Verb { .. } => "verb",
        WordCategory::Adjective => "adjective",
        WordCategory::Adverb => "adverb",
        WordCategory::Phrase => "phrase",
        WordCategory::Other => "other",
    }
}

/// In-memory collection shared between the task manager and its callers
#[derive(Debug, Default)]
pub struct SharedCollection {
    entries: RwLock<Vec<WordEntry>>,
}

impl SharedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<WordEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load the persisted collection; an absent key yields an empty collection
    pub fn load(store: &KeyValueStore) -> lexi_common::Result<Self> {
        let entries: Vec<WordEntry> = store.get(COLLECTION_STORE_KEY)?.unwrap_or_default();
        tracing::debug!(entries = entries.len(), path = %store.path().display(), "Loaded word collection");
        Ok(Self::from_entries(entries))
    }

    /// Persist a snapshot of the collection
    pub fn save(&self, store: &KeyValueStore) -> lexi_common::Result<()> {
        let snapshot = self.entries();
        store.put(COLLECTION_STORE_KEY, &snapshot)?;
        tracing::debug!(entries = snapshot.len(), path = %store.path().display(), "Saved word collection");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<WordEntry> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn statistics(&self) -> CollectionStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = CollectionStats {
            total: entries.len(),
            ..CollectionStats::default()
        };

        for entry in entries.iter() {
            *stats.by_category.entry(category_label(&entry.item.category)).or_default() += 1;
            if matches!(entry.item.category, WordCategory::Verb { conjugations: Some(_) }) {
                stats.verbs_with_conjugations += 1;
            }
            if !entry.item.examples.is_empty() {
                stats.with_examples += 1;
            }
        }

        stats
    }
}

impl WordCollection for SharedCollection {
    fn existing_keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(WordEntry::keys)
            .collect()
    }

    fn merge(&self, items: Vec<EnrichedItem>) -> usize {
        if items.is_empty() {
            return 0;
        }

        let added = items.len();
        let new_entries: Vec<WordEntry> = items.into_iter().map(WordEntry::new).collect();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(new_entries);
        added
    }
}
