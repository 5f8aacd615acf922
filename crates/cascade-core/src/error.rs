//! Error types for cascade-core
//!
//! Two families live here:
//! - `Error`: construction-time failures (invalid configuration)
//! - `QueryError`: terminal failure of a single query, carried inside an
//!   `ExecutionResult` rather than returned as `Err`

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{TransportError, TransportErrorKind};
use crate::types::QueryId;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },
}

impl Error {
    pub(crate) fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal failure of a query
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryError {
    /// Transport failure that was not retryable or exhausted its retries
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// A follow-up would have exceeded the maximum recursion depth
    #[error("recursion depth {depth} exceeds maximum {max_depth}")]
    DepthExceeded {
        /// Depth of the rejected request
        depth: u32,
        /// Configured maximum
        max_depth: u32,
    },

    /// The root's follow-up budget is spent
    #[error("root {root_id} exceeded its budget of {limit} derived queries")]
    ExpansionLimitExceeded {
        /// Root request whose budget is spent
        root_id: QueryId,
        /// Configured budget
        limit: usize,
    },

    /// Cancelled by the caller
    #[error("query cancelled")]
    Cancelled,

    /// The engine was closed before the query could run
    #[error("engine shut down")]
    Shutdown,
}

impl QueryError {
    /// Stable snake_case label of the failure class
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.kind.as_str(),
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::ExpansionLimitExceeded { .. } => "expansion_limit_exceeded",
            Self::Cancelled => "cancelled",
            Self::Shutdown => "shutdown",
        }
    }

    /// Transport failure class, if this is a transport error
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<TransportError> for QueryError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

/// Trait for user-friendly error messages
///
/// Lets a rendering layer present a specific message instead of a generic
/// failure.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for QueryError {
    fn user_message(&self) -> String {
        match self {
            QueryError::Transport(err) => match err.kind {
                TransportErrorKind::Timeout => "⏳ The agent took too long to answer.".to_string(),
                TransportErrorKind::RateLimited => {
                    "⏳ The agent is rate limiting requests.".to_string()
                }
                TransportErrorKind::ServerUnavailable => {
                    "🌐 The agent service is unavailable.".to_string()
                }
                TransportErrorKind::MalformedRequest => {
                    format!("📋 The agent rejected the query: {}", err.message)
                }
                TransportErrorKind::Unauthorized => {
                    "🔑 The agent rejected our credentials.".to_string()
                }
            },
            QueryError::DepthExceeded { depth, max_depth } => format!(
                "🔁 Follow-up at depth {} skipped (limit is {}).",
                depth, max_depth
            ),
            QueryError::ExpansionLimitExceeded { limit, .. } => {
                format!("🔁 Follow-up skipped: limit of {} per query reached.", limit)
            }
            QueryError::Cancelled => "✋ Query cancelled.".to_string(),
            QueryError::Shutdown => "❌ Engine is shutting down.".to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            QueryError::Transport(err) => match err.kind {
                TransportErrorKind::Timeout
                | TransportErrorKind::RateLimited
                | TransportErrorKind::ServerUnavailable => {
                    Some("💡 Wait a moment and try again.".to_string())
                }
                TransportErrorKind::MalformedRequest => {
                    Some("💡 Rephrase the query and try again.".to_string())
                }
                TransportErrorKind::Unauthorized => {
                    Some("💡 Check the agent endpoint credentials.".to_string())
                }
            },
            QueryError::DepthExceeded { .. } | QueryError::ExpansionLimitExceeded { .. } => {
                Some("💡 Raise engine.max_depth or engine.max_derived_per_root.".to_string())
            }
            _ => None,
        }
    }
}

/// Format a query error for display in the CLI
pub fn format_query_error(error: &QueryError) -> String {
    let mut output = error.user_message();

    if let Some(suggestion) = error.suggestion() {
        output.push_str("\n\n");
        output.push_str(&suggestion);
    }

    output
}
