//! Adapter metrics

use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec,
    HistogramVec, IntGaugeVec,
};

lazy_static::lazy_static! {
    pub static ref ADAPTER_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "adapter_requests_total",
        "Total adapter calls by outcome",
        &["adapter", "status"]
    )
    .unwrap();

    pub static ref ADAPTER_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "adapter_attempts_total",
        "Transport attempts by outcome",
        &["adapter", "outcome"]
    )
    .unwrap();

    pub static ref ADAPTER_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "adapter_request_duration_seconds",
        "Adapter call duration, retries and waits included",
        &["adapter"]
    )
    .unwrap();

    pub static ref RATE_LIMIT_WAIT: HistogramVec = register_histogram_vec!(
        "adapter_rate_limit_wait_seconds",
        "Time spent waiting for the client-side rate limiter",
        &["adapter"]
    )
    .unwrap();

    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        "adapter_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)",
        &["adapter"]
    )
    .unwrap();
}
