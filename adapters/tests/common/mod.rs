//! Shared test transport

#![allow(dead_code)]

use api_adapters::{RequestDescriptor, Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One scripted transport outcome
#[derive(Debug, Clone)]
pub enum Step {
    /// Respond with status and body
    Respond(u16, &'static str),
    /// Fail without a response
    Fail(TransportError),
    /// Never answer
    Hang,
}

/// Transport that replays a script and records when it was called
///
/// Once the script runs out, the last step repeats.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Instant, RequestDescriptor)>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        assert!(!steps.is_empty(), "script needs at least one step");
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new(vec![step])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Gaps between consecutive calls
    pub fn gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock();
        if steps.len() > 1 {
            steps.pop_front().unwrap_or(Step::Hang)
        } else {
            steps.front().cloned().unwrap_or(Step::Hang)
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push((Instant::now(), request.clone()));
        match self.next_step() {
            Step::Respond(status, body) => Ok(TransportResponse::new(status, body)),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
