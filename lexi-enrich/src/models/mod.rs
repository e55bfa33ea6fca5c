//! Data models for lexi-enrich
//!
//! - Task state machine and list-view summaries
//! - Source items and enriched word records
//! - Retry and throttle policies

pub mod enriched_item;
pub mod retry_policy;
pub mod source_item;
pub mod task;

pub use enriched_item::{
    Conjugations, EnrichedItem, ExamplePair, GrammaticalPerson, ItemRejection, WordCategory,
};
pub use retry_policy::{RetryPolicy, ThrottlePolicy};
pub use source_item::{pair_key, SourceItem};
pub use task::{Task, TaskOutcome, TaskStatus, TaskSummary};
