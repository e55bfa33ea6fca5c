//! Error types for lexi-enrich
//!
//! Severity follows how far an error propagates:
//! - attempt level: retried under the backoff policy (`is_retriable`)
//! - batch level: the batch's items are counted as failed, the task continues
//! - task level: the task transitions to `Failed` (`is_fatal`)
//!
//! Cancellation is not an error outcome; it is carried as a variant so the
//! retry loop can short-circuit with `?`.

use thiserror::Error;

/// Enrichment pipeline error
#[derive(Debug, Clone, Error)]
pub enum EnrichError {
    /// Missing or placeholder credentials / model identifier
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend rejected the credentials (401/403)
    #[error("Backend rejected credentials (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Network failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// Attempt exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// HTTP 429
    #[error("Rate limited by backend")]
    RateLimited,

    /// HTTP 5xx
    #[error("Backend error {status}: {body}")]
    Server { status: u16, body: String },

    /// Other 4xx
    #[error("Backend rejected request {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response could not be interpreted (after repair, if any)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Source-language pre-pass failed
    #[error("Translation pre-pass failed: {0}")]
    Translation(String),

    /// Cancellation observed
    #[error("Cancelled")]
    Cancelled,
}

impl EnrichError {
    /// Worth another attempt under the retry policy
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EnrichError::Transport(_)
                | EnrichError::Timeout(_)
                | EnrichError::RateLimited
                | EnrichError::Server { .. }
        )
    }

    /// Invalidates the whole task
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnrichError::Config(_) | EnrichError::Unauthorized { .. } | EnrichError::Translation(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EnrichError::Cancelled)
    }

    /// Classify an HTTP status returned by the backend
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => EnrichError::Unauthorized { status, message: body },
            429 => EnrichError::RateLimited,
            500..=599 => EnrichError::Server { status, body },
            _ => EnrichError::Rejected { status, body },
        }
    }
}

impl From<reqwest::Error> for EnrichError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EnrichError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            EnrichError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            EnrichError::MalformedResponse(err.to_string())
        } else {
            EnrichError::Transport(err.to_string())
        }
    }
}

/// Result type for pipeline operations
pub type EnrichResult<T> = Result<T, EnrichError>;
