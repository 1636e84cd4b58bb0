//! Circuit breaker per upstream adapter

use crate::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Closed (normal operation)
    Closed,
    /// Open (rejecting requests)
    Open,
    /// Half-open (letting a probe through)
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding (0=closed, 1=half-open, 2=open)
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// State change produced by a breaker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before
    pub from: CircuitState,
    /// State after
    pub to: CircuitState,
}

/// Rejection returned while the breaker is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Time until a probe is allowed
    pub retry_in: Duration,
}

/// Read-only view of a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Failures since the last success
    pub failure_count: u32,
    /// Failures that open the breaker
    pub failure_threshold: u32,
    /// Wall-clock time of the last recorded failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Breaker enabled
    pub enabled: bool,
}

/// Circuit breaker
///
/// Plain state machine; the owning adapter serializes access. Every
/// mutating call returns the transition it caused, if any.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Current state
    state: CircuitState,
    /// Failure count (since last success)
    failure_count: u32,
    /// Last failure, monotonic (drives the reset window)
    last_failure_at: Option<Instant>,
    /// Last failure, wall clock (reporting only)
    last_failure_wall: Option<DateTime<Utc>>,
    /// Config
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            last_failure_wall: None,
            config,
        }
    }

    /// Check whether a call may go out
    ///
    /// Open with the reset window still running rejects. Open with the window
    /// elapsed moves to half-open and lets the call through as a probe.
    pub fn check_before_call(&mut self) -> Result<Option<Transition>, Rejected> {
        if !self.config.enabled {
            return Ok(None);
        }

        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(None),
            CircuitState::Open => {
                let reset_timeout = self.config.reset_timeout();
                let elapsed = self
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(reset_timeout);

                if elapsed >= reset_timeout {
                    Ok(Some(self.transition(CircuitState::HalfOpen)))
                } else {
                    Err(Rejected {
                        retry_in: reset_timeout - elapsed,
                    })
                }
            }
        }
    }

    /// Record success: counters reset, breaker closed
    pub fn record_success(&mut self) -> Option<Transition> {
        if !self.config.enabled {
            return None;
        }

        self.failure_count = 0;
        if self.state == CircuitState::Closed {
            None
        } else {
            Some(self.transition(CircuitState::Closed))
        }
    }

    /// Record failure
    pub fn record_failure(&mut self) -> Option<Transition> {
        if !self.config.enabled {
            return None;
        }

        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(Instant::now());
        self.last_failure_wall = Some(Utc::now());

        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen
                if self.failure_count >= self.config.failure_threshold =>
            {
                Some(self.transition(CircuitState::Open))
            }
            // A failed probe always re-opens, even if a manual reset zeroed the count
            CircuitState::HalfOpen => Some(self.transition(CircuitState::Open)),
            _ => None,
        }
    }

    /// Time left in the reset window, when open
    pub fn retry_in(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed = self.last_failure_at.map(|at| at.elapsed())?;
        Some(self.config.reset_timeout().saturating_sub(elapsed))
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Breaker enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Snapshot for health reporting
    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_at: self.last_failure_wall,
            enabled: self.config.enabled,
        }
    }

    /// Reset circuit breaker (manual intervention)
    pub fn reset(&mut self) -> Option<Transition> {
        self.failure_count = 0;
        self.last_failure_at = None;
        self.last_failure_wall = None;
        if self.state == CircuitState::Closed {
            None
        } else {
            Some(self.transition(CircuitState::Closed))
        }
    }

    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}
