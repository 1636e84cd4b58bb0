//! Retry policy - exponential backoff between transport attempts

use crate::config::AdapterConfig;
use crate::error::AttemptError;
use crate::{Error, Result};
use std::time::Duration;

/// Retry decision after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again
    Retry(Duration),
    /// Error is not retryable
    Terminal,
    /// All attempts used
    Exhausted,
}

/// Immutable retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts >= 1` and `backoff_multiplier >= 1`
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be a finite number >= 1, got {backoff_multiplier}"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
        })
    }

    /// Create from adapter config
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            config.backoff_multiplier,
        )
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Maximum transport attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after attempt `attempt` (1-indexed) fails:
    /// `initial_delay * backoff_multiplier^(attempt-1)`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis.round() as u64)
        } else {
            Duration::from_millis(u64::MAX)
        }
    }

    /// Decide what to do after attempt `attempt` (1-indexed) failed with `error`
    pub fn decide(&self, attempt: u32, error: &AttemptError) -> RetryDecision {
        if !error.is_retryable() {
            RetryDecision::Terminal
        } else if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry(self.delay_after(attempt))
        }
    }
}
