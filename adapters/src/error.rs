//! Error types for adapters

use std::time::Duration;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Request parameter rejected before any network activity
    #[error("Validation error on parameter `{param}`: {violation}")]
    Validation {
        /// Parameter name
        param: String,
        /// Constraint that was violated
        violation: Violation,
    },

    /// Circuit breaker open
    #[error("Circuit breaker open for {adapter} ({attempts} attempts made), retry in {retry_in_ms}ms")]
    CircuitOpen {
        /// Adapter name
        adapter: String,
        /// Transport attempts made by this call before the rejection
        attempts: u32,
        /// Time left until the breaker lets a probe through
        retry_in_ms: u64,
    },

    /// Terminal transport failure (retries exhausted or non-retryable)
    #[error("Request to {url} failed after {attempts} attempts: {source}")]
    Request {
        /// Target URL
        url: String,
        /// Transport attempts made
        attempts: u32,
        /// Whether the breaker was open when the error was raised
        circuit_open: bool,
        /// Last attempt's error
        #[source]
        source: AttemptError,
    },

    /// Cancelled by the caller
    #[error("Request cancelled after {attempts} attempts")]
    Cancelled {
        /// Transport attempts made (including an aborted in-flight one)
        attempts: u32,
    },

    /// Overall deadline exceeded
    #[error("Deadline of {timeout_ms}ms exceeded after {attempts} attempts")]
    DeadlineExceeded {
        /// Overall timeout
        timeout_ms: u64,
        /// Transport attempts made
        attempts: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration failed declarative validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    /// Configuration could not be loaded
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// No adapter registered under this name
    #[error("Unknown adapter: {0}")]
    UnknownAdapter(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Transport attempts made before this error was raised
    pub fn attempts(&self) -> u32 {
        match self {
            Error::CircuitOpen { attempts, .. }
            | Error::Request { attempts, .. }
            | Error::Cancelled { attempts }
            | Error::DeadlineExceeded { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// True when the error is a circuit-open rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }
}

/// Constraint violated by a request parameter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Token is empty after normalization
    #[error("token {index} is empty (minimum length {min})")]
    Empty {
        /// Token position within the list
        index: usize,
        /// Minimum length
        min: usize,
    },

    /// Token exceeds the length bound
    #[error("token {index} has {len} characters (maximum {max})")]
    TooLong {
        /// Token position within the list
        index: usize,
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },

    /// Token carries a character outside the allow-list
    #[error("token {index} contains disallowed character {ch:?}")]
    DisallowedCharacter {
        /// Token position within the list
        index: usize,
        /// Offending character
        ch: char,
    },

    /// Single-symbol parameter given a list
    #[error("expected a single symbol, got a comma-separated list")]
    UnexpectedList,
}

/// Failure of a single transport attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// No response received
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },
}

impl AttemptError {
    /// Network failures and 5xx responses are transient
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Transport(TransportError::InvalidRequest(_)) => false,
            AttemptError::Transport(_) => true,
            AttemptError::Status { status, .. } => (500..600).contains(status),
        }
    }

    /// HTTP status, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptError::Status { status, .. } => Some(*status),
            AttemptError::Transport(_) => None,
        }
    }
}

/// Transport-level failure (no response)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, DNS, TLS or protocol failure
    #[error("Connection error: {0}")]
    Network(String),

    /// Attempt timed out
    #[error("Timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Request could not be built (bad URL, header or body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
