//! # Lexi Common Library
//!
//! Shared code for the Lexi crates:
//! - Error type
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Event types and the EventBus
//! - Key-value snapshot store for the word collection

pub mod config;
pub mod error;
pub mod events;
pub mod store;

pub use error::{Error, Result};
