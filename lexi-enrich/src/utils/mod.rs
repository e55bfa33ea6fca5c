//! Utility modules for lexi-enrich

pub mod retry;

pub use retry::{retry_with_backoff, sleep_or_cancel};
