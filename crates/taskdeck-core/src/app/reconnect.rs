//! Reconnect policy: decides the wait before re-opening the push channel.

use std::time::Duration;

/// Reconnect policy for the push channel.
///
/// The default waits a fixed 5 s between attempts; a multiplier above 1.0
/// turns it into exponential backoff capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Wait before the first reconnect attempt.
    pub base_delay: Duration,

    /// Backoff multiplier applied per consecutive failure.
    pub multiplier: f64,

    /// Upper bound for any single wait.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Wait before attempt number `failures` (1-indexed); `0` is treated as 1.
    ///
    /// delay = min(base_delay * multiplier^(failures - 1), max_delay)
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay.max(self.base_delay);
        }
        Duration::from_secs_f64(secs)
    }
}
