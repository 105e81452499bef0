//! Retry policy: how many attempts, and how long to wait between them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Retry policy applied by the run loop to each task.
///
/// Attempts happen in place: the next task in the queue waits until this
/// one has succeeded or used up `max_attempts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total executions allowed per task, the first one included.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Random spread applied to each delay, as a ratio in `[0, 1]`.
    /// `0.25` means "anywhere between 75% and 125% of the computed delay".
    pub jitter: f64,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Retries without any delay. Handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Calculate delay for the next retry based on attempt number.
    ///
    /// `attempts` is the number of attempts already made (1-indexed), so
    /// `next_delay(1)` is the wait between the first and second attempt.
    ///
    /// delay = min(base_delay * multiplier^(attempts - 1), max_delay), then jitter.
    ///
    /// With base_delay=100ms, multiplier=2.0:
    /// - attempt 1: 100ms
    /// - attempt 2: 200ms
    /// - attempt 3: 400ms
    pub fn next_delay(&self, attempts: u32) -> Duration {
        // 0 * inf は NaN になるので先に返す
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = base_secs * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + jitter * (2.0 * rand::random::<f64>() - 1.0)
        } else {
            1.0
        };

        let secs = capped * factor;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    /// Is another attempt allowed after `attempts` have been made?
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: 0.0,
        }
    }
}
