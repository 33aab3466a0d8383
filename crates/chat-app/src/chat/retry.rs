use std::time::Duration;

/// Exponential backoff for re-opening a broken feed subscription.
///
/// Attempts are numbered from 1. Appends never go through this policy; a
/// failed send waits for the user to submit again.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2.0, 8)
    }
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };

        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier,
            max_attempts,
        }
    }

    /// Never retries; a broken subscription goes straight to failed.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0, 0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before `attempt`, or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Some(Duration::from_secs_f64(capped))
    }
}
