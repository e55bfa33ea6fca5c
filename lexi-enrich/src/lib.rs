//! lexi-enrich - vocabulary enrichment pipeline
//!
//! Takes a raw word list, deduplicates it against the collection, sends it
//! to an inference backend in batches, validates (and where possible
//! repairs) what comes back, and merges the valid records into the
//! collection. Each submission runs as a background task that can be
//! queried and cancelled.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod task_manager;
pub mod utils;

pub use crate::error::{EnrichError, EnrichResult};
pub use crate::task_manager::{TaskManager, TaskManagerConfig};
