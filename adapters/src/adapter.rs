//! Resilient adapter around one upstream API
//!
//! Every call runs the same pipeline:
//!
//! ```text
//! validate params ─► [ rate limiter ─► circuit check ─► transport ] ─► result
//!                      ▲                                    │
//!                      └──────── backoff (retryable) ◄──────┘
//! ```
//!
//! Breaker and limiter state belong to the adapter instance. Two adapters
//! never share state, one adapter is shared by all of its callers.

use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState, Transition};
use crate::config::AdapterConfig;
use crate::error::{AttemptError, TransportError};
use crate::metrics::*;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{AdapterHealth, RequestDescriptor, TransportResponse};
use crate::validation::InputValidator;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

/// Longest response body kept in an error
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Why a call stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

/// Adapter for one upstream dependency
pub struct ApiAdapter {
    /// Adapter name
    name: String,
    /// Config
    config: AdapterConfig,
    /// Parameter validation
    validator: InputValidator,
    /// Request spacing
    limiter: RateLimiter,
    /// Failure isolation
    breaker: Mutex<CircuitBreaker>,
    /// Backoff policy
    retry: RetryPolicy,
    /// HTTP transport
    transport: Arc<dyn Transport>,
    /// Call counters
    counters: Counters,
}

impl std::fmt::Debug for ApiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiAdapter")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("circuit", &self.circuit_state())
            .finish()
    }
}

impl ApiAdapter {
    /// Create an adapter over `transport`
    pub fn new(config: AdapterConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config)?;

        CIRCUIT_BREAKER_STATE
            .with_label_values(&[&config.name])
            .set(CircuitState::Closed.as_gauge());

        Ok(Self {
            name: config.name.clone(),
            validator: InputValidator::new(&config.validation),
            limiter: RateLimiter::from_config(&config.rate_limit),
            breaker: Mutex::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            retry,
            transport,
            counters: Counters::default(),
            config,
        })
    }

    /// Create an adapter over a default [`ReqwestTransport`]
    pub fn with_reqwest(config: AdapterConfig) -> Result<Self> {
        Self::new(config, Arc::new(ReqwestTransport::new()?))
    }

    /// Adapter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Config
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Current breaker state
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.lock().state()
    }

    /// Breaker snapshot
    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.lock().snapshot()
    }

    /// Close the breaker and clear its counters
    pub fn reset_circuit(&self) {
        info!(adapter = %self.name, "Manually resetting circuit breaker");
        let transition = self.breaker.lock().reset();
        if let Some(transition) = transition {
            self.on_transition(transition, 0);
        }
    }

    /// Health report
    pub fn health(&self) -> AdapterHealth {
        let circuit = self.circuit_snapshot();
        AdapterHealth {
            adapter: self.name.clone(),
            status: AdapterHealth::status_for(&circuit),
            last_check: chrono::Utc::now(),
            total_requests: self.counters.total.load(Ordering::Relaxed),
            successful_requests: self.counters.successful.load(Ordering::Relaxed),
            failed_requests: self.counters.failed.load(Ordering::Relaxed),
            circuit,
        }
    }

    /// Execute a request
    ///
    /// `request.params` is normalized in place by validation, also when the
    /// call later fails.
    pub async fn execute(&self, request: &mut RequestDescriptor) -> Result<TransportResponse> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Execute a request, aborting when `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let span = info_span!(
            "adapter_call",
            adapter = %self.name,
            request_id = %Uuid::new_v4(),
            method = %request.method,
            url = %request.url,
        );

        let started = Instant::now();
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let result = self.run(request, cancel).instrument(span).await;

        ADAPTER_REQUEST_DURATION
            .with_label_values(&[&self.name])
            .observe(started.elapsed().as_secs_f64());

        let status = match &result {
            Ok(_) => {
                self.counters.successful.fetch_add(1, Ordering::Relaxed);
                "success"
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                outcome_label(e)
            }
        };
        ADAPTER_REQUESTS_TOTAL
            .with_label_values(&[&self.name, status])
            .inc();

        result
    }

    async fn run(
        &self,
        request: &mut RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        self.validator.validate(&mut request.params)?;

        let deadline = self.config.overall_timeout().map(|t| Instant::now() + t);
        let request = &*request;
        let mut attempt: u32 = 0;

        loop {
            let waited = tokio::select! {
                biased;
                interrupt = interrupted(cancel, deadline) => {
                    return Err(self.interrupt_error(interrupt, attempt));
                }
                waited = self.limiter.acquire() => waited,
            };
            if !waited.is_zero() {
                debug!(wait_ms = waited.as_millis() as u64, "Rate limiter delayed request");
                RATE_LIMIT_WAIT
                    .with_label_values(&[&self.name])
                    .observe(waited.as_secs_f64());
            }

            self.check_circuit(attempt)?;

            attempt += 1;
            let outcome = tokio::select! {
                biased;
                interrupt = interrupted(cancel, deadline) => {
                    // An attempt cut off by the deadline counts like a timeout;
                    // a caller cancellation says nothing about the upstream.
                    if interrupt == Interrupt::DeadlineExceeded {
                        self.record_failure(attempt);
                    }
                    return Err(self.interrupt_error(interrupt, attempt));
                }
                outcome = self.attempt(request) => outcome,
            };

            let error = match outcome {
                Ok(response) => {
                    ADAPTER_ATTEMPTS_TOTAL
                        .with_label_values(&[&self.name, "success"])
                        .inc();
                    self.record_success(attempt);
                    return Ok(response);
                }
                Err(error) => error,
            };

            ADAPTER_ATTEMPTS_TOTAL
                .with_label_values(&[&self.name, "failure"])
                .inc();
            let circuit_open = self.record_failure(attempt);

            match self.retry.decide(attempt, &error) {
                RetryDecision::Retry(_) if circuit_open => {
                    warn!(attempt, error = %error, "Circuit breaker open, abandoning retries");
                    return Err(self.circuit_open_error(attempt));
                }
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        interrupt = interrupted(cancel, deadline) => {
                            return Err(self.interrupt_error(interrupt, attempt));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                decision @ (RetryDecision::Terminal | RetryDecision::Exhausted) => {
                    let exhausted = decision == RetryDecision::Exhausted;
                    error!(
                        attempt,
                        exhausted,
                        circuit_open,
                        error = %error,
                        "Request failed"
                    );
                    return Err(Error::Request {
                        url: request.url.clone(),
                        attempts: attempt,
                        circuit_open,
                        source: error,
                    });
                }
            }
        }
    }

    /// One transport attempt, bounded by the per-attempt timeout
    async fn attempt(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<TransportResponse, AttemptError> {
        let timeout = self.config.request_timeout();
        let response =
            match tokio::time::timeout(timeout, self.transport.send(request, timeout)).await {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::Timeout(timeout).into()),
            };

        if response.is_success() {
            Ok(response)
        } else {
            Err(AttemptError::Status {
                status: response.status,
                body: truncate_body(response.text()),
            })
        }
    }

    fn check_circuit(&self, attempts: u32) -> Result<()> {
        let checked = self.breaker.lock().check_before_call();
        match checked {
            Ok(Some(transition)) => {
                self.on_transition(transition, 0);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(rejected) => {
                debug!(retry_in_ms = rejected.retry_in.as_millis() as u64, "Circuit breaker rejected call");
                Err(Error::CircuitOpen {
                    adapter: self.name.clone(),
                    attempts,
                    retry_in_ms: rejected.retry_in.as_millis() as u64,
                })
            }
        }
    }

    fn record_success(&self, attempt: u32) {
        let transition = self.breaker.lock().record_success();
        if let Some(transition) = transition {
            self.on_transition(transition, 0);
        }
        if attempt > 1 {
            info!(attempt, "Request succeeded after retry");
        }
    }

    /// Record a failed attempt; returns whether the breaker is now open
    fn record_failure(&self, attempt: u32) -> bool {
        let (transition, state, failures) = {
            let mut breaker = self.breaker.lock();
            let transition = breaker.record_failure();
            (transition, breaker.state(), breaker.failure_count())
        };
        if let Some(transition) = transition {
            self.on_transition(transition, failures);
        }
        debug!(attempt, failures, state = %state, "Recorded failed attempt");
        state == CircuitState::Open
    }

    fn on_transition(&self, transition: Transition, failures: u32) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[&self.name])
            .set(transition.to.as_gauge());

        match transition.to {
            CircuitState::Open => warn!(
                adapter = %self.name,
                from = %transition.from,
                failures,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => {
                info!(adapter = %self.name, "Circuit breaker half-open, probing upstream")
            }
            CircuitState::Closed => info!(
                adapter = %self.name,
                from = %transition.from,
                "Circuit breaker closed"
            ),
        }
    }

    fn circuit_open_error(&self, attempts: u32) -> Error {
        let retry_in = self.breaker.lock().retry_in().unwrap_or_default();
        Error::CircuitOpen {
            adapter: self.name.clone(),
            attempts,
            retry_in_ms: retry_in.as_millis() as u64,
        }
    }

    fn interrupt_error(&self, interrupt: Interrupt, attempts: u32) -> Error {
        match interrupt {
            Interrupt::Cancelled => {
                info!(attempts, "Request cancelled");
                Error::Cancelled { attempts }
            }
            Interrupt::DeadlineExceeded => {
                let timeout_ms = self.config.overall_timeout_ms.unwrap_or_default();
                warn!(attempts, timeout_ms, "Request deadline exceeded");
                Error::DeadlineExceeded {
                    timeout_ms,
                    attempts,
                }
            }
        }
    }
}

/// Resolves once the caller cancels or the deadline passes
async fn interrupted(cancel: &CancellationToken, deadline: Option<Instant>) -> Interrupt {
    match deadline {
        Some(deadline) => tokio::select! {
            biased;
            _ = cancel.cancelled() => Interrupt::Cancelled,
            _ = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
        },
        None => {
            cancel.cancelled().await;
            Interrupt::Cancelled
        }
    }
}

fn truncate_body(text: String) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text
    } else {
        let mut cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push('…');
        cut
    }
}

fn outcome_label(error: &Error) -> &'static str {
    match error {
        Error::Validation { .. } => "validation",
        Error::CircuitOpen { .. } => "circuit_open",
        Error::Request { .. } => "failure",
        Error::Cancelled { .. } => "cancelled",
        Error::DeadlineExceeded { .. } => "deadline",
        _ => "error",
    }
}
