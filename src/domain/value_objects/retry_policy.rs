//! Bounded exponential backoff.

use std::time::Duration;

/// Attempt counter plus delay formula `min(base * 2^attempts, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay for a given attempt number, without touching the counter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    /// Delay for the next retry, consuming one attempt.
    ///
    /// Returns `None` once `max_attempts` retries have been handed out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
