//! Retry policy for agent dispatch

use std::time::Duration;

/// Delay schedule between agent retries
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; an agent runs at most
    /// `max_retries + 1` times
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No delay between retries, for tests and fast-failing callers
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exp);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}
