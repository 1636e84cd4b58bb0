//! Shared types for adapters

use crate::circuit_breaker::{CircuitSnapshot, CircuitState};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outbound request (one logical call, reused across attempts)
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: String,
    /// Query parameters (normalized in place by validation)
    pub params: BTreeMap<String, String>,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Extra headers
    pub headers: BTreeMap<String, String>,
}

impl RequestDescriptor {
    /// New request without params, body or headers
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response returned by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lowercased names)
    pub headers: BTreeMap<String, String>,
    /// Raw body
    pub body: Bytes,
}

impl TransportResponse {
    /// Response with an empty header set
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Healthy
    Healthy,
    /// Degraded (failures recorded or probing after an outage)
    Degraded,
    /// Unhealthy (circuit breaker open)
    Unhealthy,
}

/// Adapter health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    /// Adapter name
    pub adapter: String,
    /// Status
    pub status: HealthStatus,
    /// Last check
    pub last_check: DateTime<Utc>,
    /// Total calls
    pub total_requests: u64,
    /// Successful calls
    pub successful_requests: u64,
    /// Failed calls
    pub failed_requests: u64,
    /// Circuit breaker state
    pub circuit: CircuitSnapshot,
}

impl AdapterHealth {
    /// Derive the status from the breaker snapshot
    pub fn status_for(circuit: &CircuitSnapshot) -> HealthStatus {
        match circuit.state {
            CircuitState::Open => HealthStatus::Unhealthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Closed if circuit.failure_count > 0 => HealthStatus::Degraded,
            CircuitState::Closed => HealthStatus::Healthy,
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful_requests + self.failed_requests;
        if finished == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / finished as f64
    }

    /// Calculate failure rate
    pub fn failure_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }
}
