//! Reconnect backoff schedule.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Backoff parameters.
///
/// The delay before reconnect attempt `n` (1-based, counted over the
/// client's whole lifetime) is
/// `min(base_delay + (n - 1) * increment, max_delay)` plus a uniform
/// random jitter below `max_jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect. Default: 1 s.
    pub base_delay: Duration,
    /// Added per additional attempt. Default: 2 s.
    pub increment: Duration,
    /// Ceiling for the deterministic part. Default: 20 s.
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random jitter. Default: 3 s.
    /// Zero disables jitter.
    pub max_jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            increment: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            max_jitter: Duration::from_secs(3),
        }
    }
}

impl BackoffConfig {
    /// Same schedule without jitter; what tests want.
    pub fn without_jitter(self) -> Self {
        Self {
            max_jitter: Duration::ZERO,
            ..self
        }
    }

    /// Fixes values that would make the schedule meaningless.
    ///
    /// - `max_delay` is raised to `base_delay` if it is smaller.
    pub fn validated(mut self) -> Self {
        if self.max_delay < self.base_delay {
            warn!(
                base_ms = self.base_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "max_delay below base_delay, raising"
            );
            self.max_delay = self.base_delay;
        }
        self
    }
}

/// Computes reconnect delays from a [`BackoffConfig`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    /// The deterministic part of the delay for attempt `total_retry_count`.
    ///
    /// Non-decreasing in its argument and never above `max_delay`.
    /// Attempt 0 is treated like attempt 1.
    pub fn base_delay(&self, total_retry_count: u32) -> Duration {
        let steps = total_retry_count.saturating_sub(1);
        let grown = self
            .config
            .base_delay
            .saturating_add(self.config.increment.saturating_mul(steps));
        grown.min(self.config.max_delay)
    }

    /// Full delay for attempt `total_retry_count`, jitter included.
    pub fn delay(&self, total_retry_count: u32) -> Duration {
        self.base_delay(total_retry_count) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = self.config.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max))
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
