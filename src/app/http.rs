//! HTTP agent transport
//!
//! POSTs `{"query", "context", "depth", "parent_id"}` as JSON and expects
//! `{"content", "payload"}` back.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cascade_core::{
    AgentResponse, AgentTransport, QueryContext, QueryId, QueryRequest, TransportError,
    TransportErrorKind,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::TransportSection;

#[derive(Serialize)]
struct WireRequest<'a> {
    query: &'a str,
    context: &'a QueryContext,
    depth: u32,
    parent_id: Option<QueryId>,
}

#[derive(Deserialize)]
struct WireResponse {
    content: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Agent transport over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &TransportSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("cascade/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::new(TransportErrorKind::MalformedRequest, err.to_string())
    } else {
        TransportError::new(TransportErrorKind::ServerUnavailable, err.to_string())
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn execute(&self, request: &QueryRequest) -> Result<AgentResponse, TransportError> {
        let body = WireRequest {
            query: &request.text,
            context: &request.context,
            depth: request.depth,
            parent_id: request.parent_id,
        };

        debug!(query_id = %request.id, endpoint = %self.endpoint, "Sending query");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_http_status(status.as_u16(), text));
        }

        let wire: WireResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(e.to_string())
            } else {
                TransportError::new(
                    TransportErrorKind::MalformedRequest,
                    format!("undecodable response body: {e}"),
                )
            }
        })?;

        Ok(AgentResponse::new(&request.text, wire.content).with_payload(wire.payload))
    }
}
