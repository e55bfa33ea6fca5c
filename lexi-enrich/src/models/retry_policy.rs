//! Delay policies
//!
//! Two independent throttles: [`RetryPolicy`] recovers from failed attempts of a
//! single backend call, [`ThrottlePolicy`] shapes the request rate between batches.

use lexi_common::config::{RetrySettings, ThrottleSettings};
use std::time::Duration;
use tracing::warn;

/// Retry-with-exponential-backoff policy
///
/// Pure configuration. The delay before retry `attempt` (0-based) is
/// `min(base_delay × backoff_multiplier^attempt, max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let scaled = self.base_delay.as_secs_f64() * factor;

        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled.max(0.0))
        }
    }

    /// Upper bound on the total backoff one call can spend waiting
    pub fn total_backoff_bound(&self) -> Duration {
        (0..self.max_retries).map(|i| self.delay_for(i)).sum()
    }

    /// Maximum number of attempts for one call
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        // Backoff must not shrink between attempts
        let configured = settings.backoff_multiplier;
        let backoff_multiplier = if configured.is_finite() && configured >= 1.0 {
            configured
        } else {
            let fallback = RetrySettings::default().backoff_multiplier;
            warn!(
                configured,
                fallback, "Ignoring retry backoff_multiplier below 1.0"
            );
            fallback
        };

        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier,
        }
    }
}

/// Progressive inter-batch delay
///
/// `delay_after(i) = min(base_delay + step × i, max_delay)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub base_delay: Duration,
    pub step: Duration,
    pub max_delay: Duration,
}

impl ThrottlePolicy {
    /// No delay between batches
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            step: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay inserted after batch `batch_index` (0-based) before the next one
    pub fn delay_after(&self, batch_index: usize) -> Duration {
        let index = u32::try_from(batch_index).unwrap_or(u32::MAX);
        let grown = self
            .step
            .checked_mul(index)
            .and_then(|s| s.checked_add(self.base_delay))
            .unwrap_or(self.max_delay);
        grown.min(self.max_delay)
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::from(&ThrottleSettings::default())
    }
}

impl From<&ThrottleSettings> for ThrottlePolicy {
    fn from(settings: &ThrottleSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            step: Duration::from_millis(settings.step_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(60), Duration::from_secs(10));
    }

    #[test]
    fn test_total_backoff_bound() {
        let policy = RetryPolicy::default();
        // 1 + 2 + 4
        assert_eq!(policy.total_backoff_bound(), Duration::from_secs(7));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(RetryPolicy::no_retry().total_backoff_bound(), Duration::ZERO);
    }

    #[test]
    fn test_delay_follows_multiplier_as_given() {
        let policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_millis(125));
    }

    #[test]
    fn test_settings_multiplier_below_one_rejected() {
        let settings = RetrySettings {
            backoff_multiplier: 0.5,
            ..RetrySettings::default()
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));

        let settings = RetrySettings {
            backoff_multiplier: f64::NAN,
            ..RetrySettings::default()
        };
        assert_eq!(RetryPolicy::from(&settings).backoff_multiplier, 2.0);

        let settings = RetrySettings {
            backoff_multiplier: 1.5,
            ..RetrySettings::default()
        };
        assert_eq!(RetryPolicy::from(&settings).backoff_multiplier, 1.5);
    }

    #[test]
    fn test_throttle_grows_to_ceiling() {
        let throttle = ThrottlePolicy::default();
        assert_eq!(throttle.delay_after(0), Duration::from_millis(500));
        assert_eq!(throttle.delay_after(1), Duration::from_millis(750));
        assert_eq!(throttle.delay_after(4), Duration::from_millis(1500));
        assert_eq!(throttle.delay_after(10), Duration::from_millis(3000));
        assert_eq!(throttle.delay_after(usize::MAX), Duration::from_millis(3000));
        assert_eq!(ThrottlePolicy::none().delay_after(7), Duration::ZERO);
    }
}
