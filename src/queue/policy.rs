use std::time::Duration;

/// What the queue does with a task whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    DeadLetter,
}

/// Exponential backoff capped at `max_delay`, dead-lettering after `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// `attempts` counts the attempt that just failed, starting at 1.
    pub fn decide(&self, attempts: u32, permanent: bool) -> RetryDecision {
        if permanent || attempts >= self.max_attempts {
            return RetryDecision::DeadLetter;
        }

        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        RetryDecision::RetryAfter(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2), Duration::from_secs(60))
    }
}
