//! Retry policy for operations over the pool

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Retry policy consulted by [`Pool::with`](crate::Pool::with).
///
/// Only errors classified retryable by
/// [`Error::is_retryable`](crate::Error::is_retryable) consume attempts
/// beyond the first; terminal errors stop the loop immediately.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryOptions {
    /// Maximum number of attempts, counting the first call.
    pub max_attempts: usize,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter).
    pub jitter_factor: f64,
    /// Whether to use exponential backoff.
    pub exponential: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.1,
            exponential: true,
        }
    }
}

impl RetryOptions {
    /// Create a policy with the given attempt budget and base delay.
    #[must_use]
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Set the maximum delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter factor.
    #[must_use]
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Disable exponential backoff.
    #[must_use]
    pub fn without_exponential(mut self) -> Self {
        self.exponential = false;
        self
    }

    /// Delay to sleep before the attempt numbered `attempt` (1-based; the
    /// first attempt never waits).
    pub(crate) fn delay_before(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = u32::try_from(attempt - 2).unwrap_or(u32::MAX);
        let mut delay = if self.exponential {
            self.base_delay
                .saturating_mul(2_u32.saturating_pow(exponent))
        } else {
            self.base_delay
        };

        // Jitter is deterministic on the attempt number to avoid pulling in
        // a randomness dependency.
        if self.jitter_factor > 0.0 {
            let jitter_range = (delay.as_millis() as f64 * self.jitter_factor) as u64;
            let jitter = (attempt as u64) % (jitter_range + 1);
            delay = delay.saturating_add(Duration::from_millis(jitter));
        }

        delay.min(self.max_delay)
    }
}
