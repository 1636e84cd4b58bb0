//! Adapter configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ADAPTER";

/// Per-upstream adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdapterConfig {
    /// Adapter name (used in logs and metric labels)
    #[validate(length(min = 1))]
    pub name: String,
    /// Maximum transport attempts per call
    #[validate(range(min = 1))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Growth factor between retry delays
    #[validate(range(min = 1.0))]
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Per-attempt timeout
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Deadline for the whole call, retries and waits included
    #[validate(range(min = 1))]
    #[serde(default)]
    pub overall_timeout_ms: Option<u64>,
    /// Circuit breaker settings
    #[validate(nested)]
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Client-side throttling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Input validation rules
    #[serde(default)]
    pub validation: ValidationConfig,
}

fn default_max_attempts() -> u32 {
    crate::DEFAULT_RETRY_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    crate::DEFAULT_INITIAL_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    crate::DEFAULT_BACKOFF_MULTIPLIER
}

fn default_request_timeout_ms() -> u64 {
    crate::DEFAULT_REQUEST_TIMEOUT_MS
}

impl AdapterConfig {
    /// Configuration with defaults for the given upstream
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            request_timeout_ms: default_request_timeout_ms(),
            overall_timeout_ms: None,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validation: ValidationConfig::default(),
        }
    }

    /// Load a single adapter config from a file, with `ADAPTER__*` env overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        let cfg: AdapterConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Per-attempt timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Overall deadline, if configured
    pub fn overall_timeout(&self) -> Option<Duration> {
        self.overall_timeout_ms.map(Duration::from_millis)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CircuitBreakerConfig {
    /// Breaker enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Failure threshold (open after N failures)
    #[validate(range(min = 1))]
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time the breaker stays open before letting a probe through
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    crate::DEFAULT_CB_FAILURE_THRESHOLD
}

fn default_reset_timeout_ms() -> u64 {
    crate::DEFAULT_CB_RESET_TIMEOUT_MS
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Reset window as a duration
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Request budget per minute (0 or absent disables throttling)
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl RateLimitConfig {
    /// Budget of `rpm` requests per minute
    pub fn per_minute(rpm: u32) -> Self {
        Self {
            requests_per_minute: Some(rpm),
        }
    }
}

/// How characters outside the symbol allow-list are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterPolicy {
    /// Fail validation
    #[default]
    Reject,
    /// Drop the characters, then check length
    Strip,
}

/// Input validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Handling of disallowed characters
    #[serde(default)]
    pub character_policy: CharacterPolicy,
    /// Parameters holding exactly one symbol
    #[serde(default = "default_symbol_params")]
    pub symbol_params: Vec<String>,
    /// Parameters holding a comma-separated symbol list
    #[serde(default = "default_symbol_list_params")]
    pub symbol_list_params: Vec<String>,
}

fn default_symbol_params() -> Vec<String> {
    vec!["fsym".to_string(), "tsym".to_string()]
}

fn default_symbol_list_params() -> Vec<String> {
    vec!["fsyms".to_string(), "tsyms".to_string()]
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            character_policy: CharacterPolicy::default(),
            symbol_params: default_symbol_params(),
            symbol_list_params: default_symbol_list_params(),
        }
    }
}

/// Configuration for a set of upstream adapters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Adapters keyed by upstream name
    #[serde(default)]
    pub upstreams: BTreeMap<String, UpstreamConfig>,
}

/// One upstream entry in a [`ManagerConfig`]
///
/// Same fields as [`AdapterConfig`] minus the name, which comes from the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct UpstreamConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub overall_timeout_ms: Option<u64>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl UpstreamConfig {
    /// Attach the upstream name and validate
    pub fn into_adapter_config(self, name: &str) -> Result<AdapterConfig> {
        let cfg = AdapterConfig {
            name: name.to_string(),
            max_attempts: self.max_attempts,
            initial_delay_ms: self.initial_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            request_timeout_ms: self.request_timeout_ms,
            overall_timeout_ms: self.overall_timeout_ms,
            circuit_breaker: self.circuit_breaker,
            rate_limit: self.rate_limit,
            validation: self.validation,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl ManagerConfig {
    /// Load from a file, with `ADAPTER__*` env overrides
    /// (e.g. `ADAPTER__UPSTREAMS__PRICES__MAX_ATTEMPTS=5`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        let cfg: ManagerConfig = settings.try_deserialize()?;
        if cfg.upstreams.is_empty() {
            return Err(Error::Config("no upstreams configured".to_string()));
        }
        Ok(cfg)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
