//! Retry logic for backend calls
//!
//! Implements exponential backoff for transient backend failures under a
//! [`RetryPolicy`], with cooperative cancellation at every suspension point.
//!
//! **Algorithm:**
//! 1. If cancelled, stop
//! 2. Attempt operation (raced against cancellation; losing the race drops
//!    the in-flight request)
//! 3. If successful, return result
//! 4. If retriable and attempts remain: log WARN, back off (cancellable), retry
//! 5. Otherwise return the error

use crate::error::{EnrichError, EnrichResult};
use crate::models::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sleep for `delay` unless `cancel` fires first
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> EnrichResult<()> {
    if cancel.is_cancelled() {
        return Err(EnrichError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EnrichError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Run `operation` under `policy`
///
/// `operation` receives the 0-based attempt number. At most
/// `policy.max_retries + 1` attempts are made.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "enrich batch 2")
/// * `policy` - Backoff schedule
/// * `cancel` - Task cancellation token
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> EnrichResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = EnrichResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(EnrichError::Cancelled);
        }

        if attempt > 0 {
            tracing::debug!(operation = operation_name, attempt, "Retrying backend call");
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EnrichError::Cancelled),
            result = operation(attempt) => result,
        };

        match outcome {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Backend call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) if !err.is_retriable() => {
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Non-retriable error, giving up"
                );
                return Err(err);
            }
            Err(err) if attempt >= policy.max_retries => {
                tracing::error!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    error = %err,
                    "Backend call failed: retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let backoff = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retriable backend error, will retry after backoff"
                );

                sleep_or_cancel(backoff, cancel).await?;
                attempt += 1;
            }
        }
    }
}
