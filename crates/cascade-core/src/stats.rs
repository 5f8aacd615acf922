//! Engine statistics
//!
//! Lock-free counters updated from any call-chain. Every update touches a
//! single counter, so a snapshot never observes a half-applied change.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters (since engine start or the last reset)
#[derive(Debug, Default)]
pub struct EngineStats {
    submitted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    transport_calls: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    recursive_expansions: AtomicU64,
    depth_rejections: AtomicU64,
    expansion_limit_hits: AtomicU64,
    cancelled: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Queries submitted or enqueued by callers
    pub submitted: u64,
    /// Results served from the cache
    pub cache_hits: u64,
    /// Cache lookups that missed
    pub cache_misses: u64,
    /// Individual transport attempts
    pub transport_calls: u64,
    /// Retries performed after a retryable failure
    pub retries: u64,
    /// Queries that produced a response
    pub succeeded: u64,
    /// Queries that ended in a terminal error
    pub failed: u64,
    /// Follow-up queries scheduled
    pub recursive_expansions: u64,
    /// Follow-ups rejected by the depth guard
    pub depth_rejections: u64,
    /// Follow-ups suppressed by the per-root budget
    pub expansion_limit_hits: u64,
    /// Queries cancelled by callers
    pub cancelled: u64,
}

impl StatsSnapshot {
    /// Fraction of cache lookups that hit (0.0 when nothing was looked up)
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

macro_rules! recorders {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Increment `", stringify!($field), "`")]
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl EngineStats {
    recorders! {
        record_submitted => submitted,
        record_cache_hit => cache_hits,
        record_cache_miss => cache_misses,
        record_transport_call => transport_calls,
        record_retry => retries,
        record_success => succeeded,
        record_failure => failed,
        record_expansion => recursive_expansions,
        record_depth_rejection => depth_rejections,
        record_expansion_limit => expansion_limit_hits,
        record_cancelled => cancelled,
    }

    /// Take a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            transport_calls: self.transport_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            recursive_expansions: self.recursive_expansions.load(Ordering::Relaxed),
            depth_rejections: self.depth_rejections.load(Ordering::Relaxed),
            expansion_limit_hits: self.expansion_limit_hits.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Reset every counter to zero
    pub fn reset(&self) {
        for counter in [
            &self.submitted,
            &self.cache_hits,
            &self.cache_misses,
            &self.transport_calls,
            &self.retries,
            &self.succeeded,
            &self.failed,
            &self.recursive_expansions,
            &self.depth_rejections,
            &self.expansion_limit_hits,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
