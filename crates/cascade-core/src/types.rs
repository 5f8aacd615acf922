//! Core data model
//!
//! Contains the value types that flow through the engine:
//! - `QueryId`, `QueryContext`, `QueryRequest` for pending work
//! - `Fingerprint` for cache keys
//! - `QueryState` for the per-request state machine
//! - `ExecutionResult` for completed work

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::QueryError;
use crate::transport::AgentResponse;

/// Opaque identity of a query request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(Uuid);

impl QueryId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied context used to disambiguate otherwise identical queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Conversation the query belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Additional disambiguating fields (sorted, so fingerprints are stable)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl QueryContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conversation id
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Add a disambiguating attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Deterministic cache key derived from query text and context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a query.
    ///
    /// The text is normalised first (trimmed, lower-cased, runs of whitespace
    /// collapsed to one space), so `"Sales  Report "` and `"sales report"` map
    /// to the same key. Context fields are hashed in sorted order.
    #[must_use]
    pub fn compute(text: &str, context: &QueryContext) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_query(text).as_bytes());
        hasher.update([0u8]);
        if let Some(conversation) = &context.conversation_id {
            hasher.update(b"conversation=");
            hasher.update(conversation.as_bytes());
            hasher.update([0u8]);
        }
        for (key, value) in &context.attributes {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }

        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Hex representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise query text for fingerprinting and duplicate detection
#[must_use]
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a request entered the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Submitted directly by a caller, queued FIFO
    Batch,
    /// Derived from a prior response, stacked LIFO
    Recursive,
}

/// A unit of pending work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Request id
    pub id: QueryId,
    /// Natural-language query text
    pub text: String,
    /// Disambiguating context
    pub context: QueryContext,
    /// Originating mode
    pub mode: QueryMode,
    /// Recursion depth (0 for batch requests)
    pub depth: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Request this one was derived from
    pub parent_id: Option<QueryId>,
    /// Batch request at the root of this request's tree
    pub root_id: QueryId,
}

impl QueryRequest {
    /// Create a batch request at depth 0
    #[must_use]
    pub fn batch(text: impl Into<String>, context: QueryContext) -> Self {
        let id = QueryId::new();
        Self {
            id,
            text: text.into(),
            context,
            mode: QueryMode::Batch,
            depth: 0,
            created_at: Utc::now(),
            parent_id: None,
            root_id: id,
        }
    }

    /// Derive a recursive child of this request.
    ///
    /// The child shares the parent's context and root, and sits exactly one
    /// level deeper.
    #[must_use]
    pub fn derive(&self, text: impl Into<String>) -> Self {
        Self {
            id: QueryId::new(),
            text: text.into(),
            context: self.context.clone(),
            mode: QueryMode::Recursive,
            depth: self.depth + 1,
            created_at: Utc::now(),
            parent_id: Some(self.id),
            root_id: self.root_id,
        }
    }

    /// Cache key for this request
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.text, &self.context)
    }

    /// Whether this request started its own tree
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Held by the scheduler
    Pending,
    /// Taken by a worker; retries happen inside this state
    InFlight,
    /// Completed with a response
    Succeeded,
    /// Completed with a terminal error
    Failed,
    /// Removed by the caller before its result was consumed
    Cancelled,
}

impl QueryState {
    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Check whether moving to `next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: QueryState) -> bool {
        match (self, next) {
            (Self::Pending, Self::InFlight | Self::Cancelled) => true,
            (Self::InFlight, Self::Succeeded | Self::Failed | Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// Outcome of executing (or refusing to execute) a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Request the result belongs to
    pub query_id: QueryId,
    /// Cache key of the request
    pub fingerprint: Fingerprint,
    /// Query text, for display
    pub text: String,
    /// Recursion depth of the request
    pub depth: u32,
    /// Parent request, for follow-ups
    pub parent_id: Option<QueryId>,
    /// Whether a response was obtained
    pub success: bool,
    /// Response payload (present on success)
    pub response: Option<AgentResponse>,
    /// Terminal error (present on failure)
    pub error: Option<QueryError>,
    /// Transport attempts consumed
    pub attempts: u32,
    /// Total time spent in backoff between attempts
    #[serde(with = "duration_ms")]
    pub total_wait: Duration,
    /// Whether the response came from the cache
    pub served_from_cache: bool,
}

impl ExecutionResult {
    /// Successful result produced by the transport
    #[must_use]
    pub fn succeeded(request: &QueryRequest, response: AgentResponse, attempts: u32, total_wait: Duration) -> Self {
        Self {
            success: true,
            response: Some(response),
            attempts,
            total_wait,
            ..Self::base(request)
        }
    }

    /// Successful result served from the cache without a transport call
    #[must_use]
    pub fn cached(request: &QueryRequest, response: AgentResponse) -> Self {
        Self {
            success: true,
            response: Some(response),
            served_from_cache: true,
            ..Self::base(request)
        }
    }

    /// Failed result carrying the terminal error
    #[must_use]
    pub fn failed(request: &QueryRequest, error: QueryError, attempts: u32, total_wait: Duration) -> Self {
        Self {
            error: Some(error),
            attempts,
            total_wait,
            ..Self::base(request)
        }
    }

    /// Failed result for a request that never reached the transport
    #[must_use]
    pub fn rejected(request: &QueryRequest, error: QueryError) -> Self {
        Self::failed(request, error, 0, Duration::ZERO)
    }

    fn base(request: &QueryRequest) -> Self {
        Self {
            query_id: request.id,
            fingerprint: request.fingerprint(),
            text: request.text.clone(),
            depth: request.depth,
            parent_id: request.parent_id,
            success: false,
            response: None,
            error: None,
            attempts: 0,
            total_wait: Duration::ZERO,
            served_from_cache: false,
        }
    }

    /// Terminal state this result represents
    #[must_use]
    pub fn state(&self) -> QueryState {
        match (&self.error, self.success) {
            (_, true) => QueryState::Succeeded,
            (Some(QueryError::Cancelled), false) => QueryState::Cancelled,
            _ => QueryState::Failed,
        }
    }

    /// Stable label of the failure class, if any
    #[must_use]
    pub fn error_class(&self) -> Option<&'static str> {
        self.error.as_ref().map(QueryError::class)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
