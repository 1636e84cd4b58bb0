//! # Verinode API Adapters
//!
//! Resilient outbound connectivity for third-party HTTP APIs:
//! - Pre-flight validation of symbol parameters
//! - Client-side rate limiting per upstream
//! - Circuit-breaker per upstream
//! - Retries with exponential backoff
//! - Health monitoring and prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Adapter Manager (registry by name)         │
//! └────────────┬────────────────────────────────────────┘
//!              │
//!     ┌────────┼────────────────┐
//!     │        │                │
//! ┌───▼────┐ ┌─▼──────┐ ┌───────▼──────┐
//! │ prices │ │  news  │ │   identity   │   one ApiAdapter per upstream
//! └───┬────┘ └─┬──────┘ └───────┬──────┘
//!     │        │                │
//! ┌───▼────────▼────────────────▼────────────────────┐
//! │ Validator → Rate limiter → Circuit breaker →     │
//! │ Transport (reqwest) → Retry with backoff         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use api_adapters::{AdapterConfig, ApiAdapter, RequestDescriptor};
//!
//! # async fn run() -> api_adapters::Result<()> {
//! let adapter = ApiAdapter::with_reqwest(AdapterConfig::new("prices"))?;
//! let mut request = RequestDescriptor::get("https://min-api.cryptocompare.com/data/price")
//!     .param("fsym", "btc")
//!     .param("tsyms", "usd,eur");
//! let response = adapter.execute(&mut request).await?;
//! assert_eq!(request.params["fsym"], "BTC");
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod adapter;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod manager;
#[allow(missing_docs)]
pub mod metrics;
pub mod rate_limiter;
pub mod retry;
pub mod transport;
pub mod types;
pub mod validation;

pub use adapter::ApiAdapter;
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use config::{
    AdapterConfig, CharacterPolicy, CircuitBreakerConfig, ManagerConfig, RateLimitConfig,
    ValidationConfig,
};
pub use error::{AttemptError, Error, Result, TransportError, Violation};
pub use manager::AdapterManager;
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
pub use transport::{ReqwestTransport, Transport};
pub use types::*;
pub use validation::InputValidator;

/// Default transport attempts per call
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (milliseconds)
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Default growth factor between retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default circuit breaker threshold (failures before opening)
pub const DEFAULT_CB_FAILURE_THRESHOLD: u32 = 5;

/// Default circuit breaker reset window (milliseconds before half-open)
pub const DEFAULT_CB_RESET_TIMEOUT_MS: u64 = 60_000;

/// Default per-attempt timeout (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
