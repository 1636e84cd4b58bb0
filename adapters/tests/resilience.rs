//! Retry, circuit breaker, rate limit and cancellation behavior of `ApiAdapter`
//!
//! All tests run on a paused tokio clock, so delays are exact and instant.

mod common;

use api_adapters::{
    AdapterConfig, ApiAdapter, AttemptError, CancellationToken, CircuitState, Error,
    RateLimitConfig, RequestDescriptor, TransportError, Violation,
};
use common::{ScriptedTransport, Step};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn config(max_attempts: u32, initial_delay_ms: u64, backoff_multiplier: f64) -> AdapterConfig {
    let mut config = AdapterConfig::new("test-upstream");
    config.max_attempts = max_attempts;
    config.initial_delay_ms = initial_delay_ms;
    config.backoff_multiplier = backoff_multiplier;
    config
}

fn get() -> RequestDescriptor {
    RequestDescriptor::get("https://upstream.test/data/price")
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn assert_between(actual: Duration, low: Duration, high: Duration) {
    assert!(
        actual >= low && actual < high,
        "expected {actual:?} in [{low:?}, {high:?})"
    );
}

#[tokio::test(start_paused = true)]
async fn test_persistent_503_uses_every_attempt_with_backoff() {
    let transport = ScriptedTransport::always(Step::Respond(503, "Service Unavailable"));
    let adapter = ApiAdapter::new(config(3, 100, 2.0), transport.clone()).unwrap();

    let err = adapter.execute(&mut get()).await.unwrap_err();

    assert_eq!(transport.call_count(), 3);
    let gaps = transport.gaps();
    assert_between(gaps[0], ms(100), ms(101));
    assert_between(gaps[1], ms(200), ms(201));

    assert!(err.to_string().contains("after 3 attempts"), "{err}");
    match err {
        Error::Request {
            attempts,
            circuit_open,
            source,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(!circuit_open);
            assert_eq!(source.status(), Some(503));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_terminal_on_first_attempt() {
    let transport = ScriptedTransport::always(Step::Respond(404, "Not Found"));
    let adapter = ApiAdapter::new(config(3, 100, 2.0), transport.clone()).unwrap();

    let started = Instant::now();
    let err = adapter.execute(&mut get()).await.unwrap_err();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    match err {
        Error::Request {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(
                source,
                AttemptError::Status {
                    status: 404,
                    body: "Not Found".to_string()
                }
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
    // Terminal failures still count against the breaker
    assert_eq!(adapter.circuit_snapshot().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_network_failures_are_retried_until_success() {
    let transport = ScriptedTransport::new(vec![
        Step::Fail(TransportError::Network("connection reset".to_string())),
        Step::Respond(500, "oops"),
        Step::Respond(200, r#"{"USD":64000}"#),
    ]);
    let adapter = ApiAdapter::new(config(3, 50, 2.0), transport.clone()).unwrap();

    let response = adapter.execute(&mut get()).await.unwrap();

    assert_eq!(transport.call_count(), 3);
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), r#"{"USD":64000}"#);
    assert_eq!(adapter.circuit_snapshot().failure_count, 0);
    assert_eq!(adapter.circuit_state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_at_threshold_and_recovers_after_reset_timeout() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(502, "bad gateway"),
        Step::Respond(502, "bad gateway"),
        Step::Respond(502, "bad gateway"),
        Step::Respond(200, "ok"),
    ]);
    let mut cfg = config(1, 0, 1.0);
    cfg.circuit_breaker.failure_threshold = 3;
    cfg.circuit_breaker.reset_timeout_ms = 1_000;
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    for _ in 0..2 {
        assert!(adapter.execute(&mut get()).await.is_err());
        assert_eq!(adapter.circuit_state(), CircuitState::Closed);
    }
    let err = adapter.execute(&mut get()).await.unwrap_err();
    assert!(matches!(err, Error::Request { circuit_open: true, .. }));
    assert_eq!(adapter.circuit_state(), CircuitState::Open);

    // Rejected without touching the transport
    let err = adapter.execute(&mut get()).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(err.attempts(), 0);
    assert_eq!(transport.call_count(), 3);

    tokio::time::advance(ms(999)).await;
    assert!(adapter.execute(&mut get()).await.unwrap_err().is_circuit_open());

    // Reset window elapsed: probe goes through and closes the breaker
    tokio::time::advance(ms(1)).await;
    let response = adapter.execute(&mut get()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(transport.call_count(), 4);

    let snapshot = adapter.circuit_snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opening_mid_retry_stops_immediately() {
    let transport = ScriptedTransport::always(Step::Respond(503, "down"));
    let mut cfg = config(5, 100, 2.0);
    cfg.circuit_breaker.failure_threshold = 2;
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    let started = Instant::now();
    let err = adapter.execute(&mut get()).await.unwrap_err();

    assert!(err.is_circuit_open(), "{err}");
    assert_eq!(err.attempts(), 2);
    assert_eq!(transport.call_count(), 2);
    // Only the first backoff was slept
    assert_between(started.elapsed(), ms(100), ms(200));
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_count() {
    let transport = ScriptedTransport::new(vec![
        Step::Respond(500, "e"),
        Step::Respond(500, "e"),
        Step::Respond(200, "ok"),
    ]);
    let adapter = ApiAdapter::new(config(1, 0, 1.0), transport).unwrap();

    assert!(adapter.execute(&mut get()).await.is_err());
    assert!(adapter.execute(&mut get()).await.is_err());
    assert_eq!(adapter.circuit_snapshot().failure_count, 2);

    adapter.execute(&mut get()).await.unwrap();
    assert_eq!(adapter.circuit_snapshot().failure_count, 0);
    assert_eq!(adapter.circuit_state(), CircuitState::Closed);

    let health = adapter.health();
    assert_eq!(health.total_requests, 3);
    assert_eq!(health.failed_requests, 2);
    assert_eq!(health.successful_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_breaker_never_opens() {
    let transport = ScriptedTransport::always(Step::Respond(500, "e"));
    let mut cfg = config(1, 0, 1.0);
    cfg.circuit_breaker.enabled = false;
    cfg.circuit_breaker.failure_threshold = 1;
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    for _ in 0..5 {
        let err = adapter.execute(&mut get()).await.unwrap_err();
        assert!(matches!(err, Error::Request { .. }));
    }
    assert_eq!(transport.call_count(), 5);
    assert_eq!(adapter.circuit_state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_calls_respect_rate_limit() {
    let transport = ScriptedTransport::always(Step::Respond(200, "ok"));
    let mut cfg = config(1, 0, 1.0);
    cfg.rate_limit = RateLimitConfig::per_minute(600);
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    adapter.execute(&mut get()).await.unwrap();
    adapter.execute(&mut get()).await.unwrap();

    assert!(transport.gaps()[0] >= ms(100));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_the_rate_limit() {
    let transport = ScriptedTransport::always(Step::Respond(200, "ok"));
    let mut cfg = config(1, 0, 1.0);
    cfg.rate_limit = RateLimitConfig::per_minute(600);
    let adapter = Arc::new(ApiAdapter::new(cfg, transport.clone()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.execute(&mut get()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(transport.call_count(), 4);
    let mut times = transport.call_times();
    times.sort();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= ms(100));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_does_not_delay_next_call() {
    let transport = ScriptedTransport::always(Step::Respond(200, "ok"));
    let mut cfg = config(1, 0, 1.0);
    cfg.rate_limit = RateLimitConfig::per_minute(600);
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    let start = Instant::now();
    adapter.execute(&mut get()).await.unwrap();

    // Second call is cancelled 10ms into its 100ms limiter wait
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(10)).await;
        trigger.cancel();
    });
    let err = adapter
        .execute_with_cancel(&mut get(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { attempts: 0 }), "{err}");

    tokio::time::sleep_until(start + ms(150)).await;
    adapter.execute(&mut get()).await.unwrap();

    assert_eq!(transport.call_count(), 2);
    assert_eq!(transport.gaps()[0], ms(150));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_while_rate_limited_frees_the_slot() {
    let transport = ScriptedTransport::always(Step::Respond(200, "ok"));
    let mut cfg = config(1, 0, 1.0);
    cfg.rate_limit = RateLimitConfig::per_minute(60);
    cfg.overall_timeout_ms = Some(900);
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    adapter.execute(&mut get()).await.unwrap();
    let first = Instant::now();

    // Would need to wait 1s for the limiter; the 900ms deadline fires first
    let err = adapter.execute(&mut get()).await.unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded { attempts: 0, .. }), "{err}");
    assert_eq!(adapter.circuit_snapshot().failure_count, 0);

    // Next slot is still one interval after the last request that went out
    adapter.execute(&mut get()).await.unwrap();
    assert_eq!(transport.call_times()[1] - first, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_rate_limited_too() {
    let transport = ScriptedTransport::new(vec![Step::Respond(503, "busy"), Step::Respond(200, "ok")]);
    let mut cfg = config(2, 10, 1.0);
    cfg.rate_limit = RateLimitConfig::per_minute(60);
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    adapter.execute(&mut get()).await.unwrap();

    // Limiter spacing (1s) dominates the 10ms backoff
    assert!(transport.gaps()[0] >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_params_are_normalized_in_place_and_sent_normalized() {
    let transport = ScriptedTransport::always(Step::Respond(200, "{}"));
    let adapter = ApiAdapter::new(config(1, 0, 1.0), transport.clone()).unwrap();

    let mut request = get().param("fsym", "btc").param("tsyms", "usd, eur");
    adapter.execute(&mut request).await.unwrap();

    assert_eq!(request.params["fsym"], "BTC");
    assert_eq!(request.params["tsyms"], "USD,EUR");
    let sent = &transport.requests()[0];
    assert_eq!(sent.params, request.params);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_params_never_reach_transport() {
    let transport = ScriptedTransport::always(Step::Respond(200, "{}"));
    let adapter = ApiAdapter::new(config(3, 100, 2.0), transport.clone()).unwrap();

    for (name, value) in [
        ("fsym", "TOOLONGSYMBOL"),
        ("tsyms", "USD,EU%"),
        ("fsym", ""),
        ("fsym", "ßtc"),
        ("tsym", "ıd"),
    ] {
        let mut request = get().param(name, value);
        let err = adapter.execute(&mut request).await.unwrap_err();
        match err {
            Error::Validation { param, .. } => assert_eq!(param, name),
            other => panic!("unexpected error {other:?}"),
        }
    }

    let mut request = get().param("tsyms", "USD,EU%");
    let err = adapter.execute(&mut request).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Validation {
            violation: Violation::DisallowedCharacter { index: 1, ch: '%' },
            ..
        }
    ));

    assert_eq!(transport.call_count(), 0);
    // Validation failures never touch the breaker
    assert_eq!(adapter.circuit_snapshot().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_keeps_recorded_failure() {
    let transport = ScriptedTransport::always(Step::Respond(503, "busy"));
    let adapter = ApiAdapter::new(config(3, 1_000, 2.0), transport.clone()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = adapter
        .execute_with_cancel(&mut get(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { attempts: 1 }), "{err}");
    assert_between(started.elapsed(), ms(50), ms(60));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(adapter.circuit_snapshot().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_in_flight_attempt_is_not_a_failure() {
    let transport = ScriptedTransport::always(Step::Hang);
    let adapter = ApiAdapter::new(config(3, 100, 2.0), transport.clone()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(20)).await;
        trigger.cancel();
    });

    let err = adapter
        .execute_with_cancel(&mut get(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { attempts: 1 }), "{err}");
    assert_eq!(adapter.circuit_snapshot().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_call_makes_no_attempt() {
    let transport = ScriptedTransport::always(Step::Respond(200, "ok"));
    let adapter = ApiAdapter::new(config(3, 100, 2.0), transport.clone()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = adapter
        .execute_with_cancel(&mut get(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { attempts: 0 }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_overall_deadline_during_attempt_counts_as_failure() {
    let transport = ScriptedTransport::always(Step::Hang);
    let mut cfg = config(3, 100, 2.0);
    cfg.overall_timeout_ms = Some(500);
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    let started = Instant::now();
    let err = adapter.execute(&mut get()).await.unwrap_err();

    assert!(
        matches!(err, Error::DeadlineExceeded { timeout_ms: 500, attempts: 1 }),
        "{err}"
    );
    assert_between(started.elapsed(), ms(500), ms(501));
    assert_eq!(adapter.circuit_snapshot().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_per_attempt_timeout_is_retryable() {
    let transport = ScriptedTransport::always(Step::Hang);
    let mut cfg = config(2, 100, 2.0);
    cfg.request_timeout_ms = 200;
    let adapter = ApiAdapter::new(cfg, transport.clone()).unwrap();

    let started = Instant::now();
    let err = adapter.execute(&mut get()).await.unwrap_err();

    assert_eq!(transport.call_count(), 2);
    // 200ms attempt + 100ms backoff + 200ms attempt
    assert_between(started.elapsed(), ms(500), ms(503));
    match err {
        Error::Request {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(source, AttemptError::Transport(TransportError::Timeout(ms(200))));
        }
        other => panic!("unexpected error {other:?}"),
    }
}
