//! Pipeline services
//!
//! - `input`: raw submission parsing and script detection
//! - `batch_planner`: dedup and chunking
//! - `completion_backend` / `prompts`: talking to the model
//! - `enrichment_client`: retrying batch calls and record matching
//! - `result_validator`: response validation and repair
//! - `collection`: the merge target

pub mod batch_planner;
pub mod collection;
pub mod completion_backend;
pub mod enrichment_client;
pub mod input;
pub mod prompts;
pub mod result_validator;

pub use batch_planner::{BatchPlan, BatchPlanner, DEFAULT_BATCH_SIZE};
pub use collection::{CollectionStats, SharedCollection, WordCollection, WordEntry};
pub use completion_backend::{CompletionBackend, CompletionRequest, HttpCompletionBackend};
pub use enrichment_client::{EnrichmentClient, ItemOutcome};
pub use input::{parse_input, ParsedInput, Script};
pub use prompts::PromptContext;
pub use result_validator::{ResultValidator, ValidationIssue, ValidationReport};
