//! Client-side request spacing

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval rate limiter
///
/// Waiters queue on a fair async lock and hold their turn across the wait,
/// so concurrent callers are released in arrival order at least
/// `min_interval` apart. `last_request_at` only moves when a wait completes;
/// a waiter dropped mid-sleep (cancellation, deadline) leaves it untouched
/// and the next caller is spaced from the last request actually released.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing (`None` when disabled)
    min_interval: Option<Duration>,
    /// Queue of waiting callers
    turn: tokio::sync::Mutex<()>,
    /// Release time of the most recent request
    last_request_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter for `requests_per_minute` (0 disables it)
    pub fn new(requests_per_minute: u32) -> Self {
        let min_interval =
            (requests_per_minute > 0).then(|| Duration::from_secs(60) / requests_per_minute);
        Self {
            min_interval,
            turn: tokio::sync::Mutex::new(()),
            last_request_at: Mutex::new(None),
        }
    }

    /// Create from config
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute.unwrap_or(0))
    }

    /// Disabled limiter
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Limiter enabled
    pub fn is_enabled(&self) -> bool {
        self.min_interval.is_some()
    }

    /// Minimum spacing between requests
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Release time of the most recent request
    pub fn last_request_at(&self) -> Option<Instant> {
        *self.last_request_at.lock()
    }

    /// Wait until this caller may issue a request; returns the time waited
    ///
    /// Cancel-safe: dropping the future before it resolves releases the turn
    /// without consuming a slot.
    pub async fn acquire(&self) -> Duration {
        let Some(interval) = self.min_interval else {
            return Duration::ZERO;
        };

        let started = Instant::now();
        let _turn = self.turn.lock().await;

        let last = *self.last_request_at.lock();
        if let Some(ready_at) = last.map(|at| at + interval) {
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *self.last_request_at.lock() = Some(Instant::now());
        started.elapsed()
    }
}
