//! Test doubles shared by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::transport::{AgentResponse, AgentTransport, TransportError};
use crate::types::QueryRequest;

/// Transport that answers from a script and records every call
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    calls: Mutex<Vec<(String, Instant)>>,
    failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    permanent: Mutex<HashMap<String, TransportError>>,
    payloads: Mutex<HashMap<String, serde_json::Value>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail the next call for `text` with `err` (queued, one per call)
    pub(crate) fn fail_once(&self, text: &str, err: TransportError) {
        self.failures
            .lock()
            .unwrap()
            .entry(text.to_string())
            .or_default()
            .push_back(err);
    }

    /// Fail every call for `text` with `err`
    pub(crate) fn fail_always(&self, text: &str, err: TransportError) {
        self.permanent.lock().unwrap().insert(text.to_string(), err);
    }

    /// Attach a payload to the response for `text`
    pub(crate) fn respond_with(&self, text: &str, payload: serde_json::Value) {
        self.payloads.lock().unwrap().insert(text.to_string(), payload);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn execute(&self, request: &QueryRequest) -> Result<AgentResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.text.clone(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(err) = self.permanent.lock().unwrap().get(&request.text) {
            return Err(err.clone());
        }
        let queued = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&request.text)
            .and_then(VecDeque::pop_front);
        if let Some(err) = queued {
            return Err(err);
        }

        let payload = self
            .payloads
            .lock()
            .unwrap()
            .get(&request.text)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Ok(AgentResponse::new(&request.text, format!("answer to {}", request.text))
            .with_payload(payload))
    }
}
