//! Cascade Core - Query Scheduling Engine
//!
//! This crate sits between callers and a remote agent service, including:
//! - Cache: Fingerprint-keyed response cache with TTL and LRU eviction
//! - Retry: Bounded exponential backoff per transport call
//! - Scheduler: Batch queue plus follow-up stack with a depth guard
//! - Expander: Turning responses into recursive follow-up queries
//! - Engine: The facade that ties them together and keeps statistics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod expander;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::ResponseCache;
pub use config::{CacheConfig, EngineConfig};
pub use engine::Engine;
pub use error::{format_query_error, Error, QueryError, Result, UserFriendlyError};
pub use expander::{ExpansionOutcome, FollowUpDetector, FollowUpExpander, MarkerDetector, NoFollowUps};
pub use retry::{JitterRange, RetryExecutor, RetryPolicy};
pub use scheduler::Scheduler;
pub use stats::{EngineStats, StatsSnapshot};
pub use transport::{AgentResponse, AgentTransport, TransportError, TransportErrorKind};
pub use types::{
    normalize_query, ExecutionResult, Fingerprint, QueryContext, QueryId, QueryMode, QueryRequest,
    QueryState,
};
