//! Transport seam
//!
//! The engine never talks to the network itself. It calls an
//! [`AgentTransport`] supplied by the embedding application and classifies
//! whatever [`TransportError`] comes back.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::QueryRequest;

/// Response returned by the remote agent service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Query text the response answers
    pub query: String,
    /// Natural-language answer
    pub content: String,
    /// Structured payload (opaque to the engine; follow-up detectors and
    /// renderers interpret it)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AgentResponse {
    /// Create a response without a structured payload
    #[must_use]
    pub fn new(query: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            content: content.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a structured payload
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Failure classes reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The attempt exceeded its deadline (HTTP 408 or client-side timeout)
    Timeout,
    /// The service asked us to slow down (HTTP 429)
    RateLimited,
    /// Transient server-side failure (HTTP 5xx, connection refused)
    ServerUnavailable,
    /// The request itself is invalid and will never succeed
    MalformedRequest,
    /// Credentials were rejected (HTTP 401/403)
    Unauthorized,
}

impl TransportErrorKind {
    /// Map an HTTP status code to a failure class
    #[must_use]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            408 => Self::Timeout,
            429 => Self::RateLimited,
            401 | 403 => Self::Unauthorized,
            500..=599 => Self::ServerUnavailable,
            _ => Self::MalformedRequest,
        }
    }

    /// Stable snake_case label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerUnavailable => "server_unavailable",
            Self::MalformedRequest => "malformed_request",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Classes that are worth retrying under the default policy
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::ServerUnavailable)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// Failure class
    pub kind: TransportErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl TransportError {
    /// Create a new transport error
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a timeout
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Build an error from an HTTP status and response body
    #[must_use]
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        Self::new(
            TransportErrorKind::from_http_status(status),
            format!("HTTP {}: {}", status, body.into()),
        )
    }
}

/// Abstract call to the remote agent service.
///
/// Implementations suspend inside `execute`; the engine applies deadlines,
/// retries and caching around it.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Execute one request against the remote agent
    async fn execute(&self, request: &QueryRequest) -> Result<AgentResponse, TransportError>;
}
