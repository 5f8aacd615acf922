//! Engine configuration
//!
//! Contains configuration types for the engine:
//! - `CacheConfig` for the response cache
//! - `EngineConfig` for everything else (the retry policy lives in
//!   [`crate::retry::RetryPolicy`])
//!
//! The configuration is immutable once an engine is built and is validated
//! exactly once, in [`EngineConfig::validate`].

use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Configuration for the response cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries (0 disables caching)
    pub capacity: usize,
    /// Time-to-live of an entry
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Response cache settings
    pub cache: CacheConfig,
    /// Retry policy applied to every transport call
    pub retry: RetryPolicy,
    /// Deepest recursion level a follow-up may reach (roots are depth 0)
    pub max_depth: u32,
    /// Maximum follow-ups derived from a single root (None = unlimited)
    pub max_derived_per_root: Option<usize>,
    /// Maximum executions in flight across all submissions
    pub concurrency_limit: usize,
    /// Deadline of a single transport attempt
    pub attempt_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            max_depth: 3,
            max_derived_per_root: Some(32),
            concurrency_limit: 4,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = capacity;
        self
    }

    /// Set cache TTL
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    /// Set retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set maximum recursion depth
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the per-root follow-up budget
    #[must_use]
    pub fn with_max_derived_per_root(mut self, limit: Option<usize>) -> Self {
        self.max_derived_per_root = limit;
        self
    }

    /// Set the concurrency limit
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Check the configuration for values the engine cannot run with
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity > 0 && self.cache.ttl.is_zero() {
            return Err(Error::invalid_config(
                "cache.ttl",
                "must be greater than zero when caching is enabled",
            ));
        }
        if self.cache.capacity > 0 && Instant::now().checked_add(self.cache.ttl).is_none() {
            return Err(Error::invalid_config(
                "cache.ttl",
                format!("{}s is too large to schedule an expiry", self.cache.ttl.as_secs()),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(Error::invalid_config(
                "retry.multiplier",
                format!("must be a finite number >= 1.0, got {}", self.retry.multiplier),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(Error::invalid_config(
                "retry.max_delay",
                "must not be smaller than retry.base_delay",
            ));
        }
        if self.retry.jitter.min > self.retry.jitter.max {
            return Err(Error::invalid_config(
                "retry.jitter",
                "minimum must not exceed maximum",
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(Error::invalid_config(
                "concurrency_limit",
                "must be at least 1",
            ));
        }
        if self.concurrency_limit > Semaphore::MAX_PERMITS {
            return Err(Error::invalid_config(
                "concurrency_limit",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::invalid_config(
                "attempt_timeout",
                "must be greater than zero",
            ));
        }
        if self.max_derived_per_root == Some(0) {
            return Err(Error::invalid_config(
                "max_derived_per_root",
                "use None to disable the budget instead of 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::JitterRange;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.cache.capacity, 256);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_cache_capacity(10)
            .with_cache_ttl(Duration::from_secs(5))
            .with_max_depth(7)
            .with_max_derived_per_root(None)
            .with_concurrency_limit(2)
            .with_attempt_timeout(Duration::from_millis(500));

        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.ttl, Duration::from_secs(5));
        assert_eq!(config.max_depth, 7);
        assert_eq!(config.max_derived_per_root, None);
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.attempt_timeout, Duration::from_millis(500));
    }

    fn invalid_field(config: EngineConfig) -> String {
        match config.validate() {
            Err(Error::InvalidConfig { field, .. }) => field,
            Ok(()) => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_validation_failures() {
        assert_eq!(
            invalid_field(EngineConfig::new().with_concurrency_limit(0)),
            "concurrency_limit"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_retry(RetryPolicy::new().with_max_attempts(0))),
            "retry.max_attempts"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_retry(RetryPolicy::new().with_multiplier(0.5))),
            "retry.multiplier"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_retry(
                RetryPolicy::new().with_jitter(JitterRange::new(
                    Duration::from_millis(10),
                    Duration::from_millis(1)
                ))
            )),
            "retry.jitter"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_cache_ttl(Duration::ZERO)),
            "cache.ttl"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_attempt_timeout(Duration::ZERO)),
            "attempt_timeout"
        );
        assert_eq!(
            invalid_field(EngineConfig::new().with_max_derived_per_root(Some(0))),
            "max_derived_per_root"
        );
    }

    #[test]
    fn test_disabled_cache_allows_zero_ttl() {
        let config = EngineConfig::new()
            .with_cache_capacity(0)
            .with_cache_ttl(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unrepresentable_ttl_is_rejected() {
        let config = EngineConfig::new().with_cache_ttl(Duration::from_secs(u64::MAX));
        assert_eq!(invalid_field(config), "cache.ttl");

        let disabled = EngineConfig::new()
            .with_cache_capacity(0)
            .with_cache_ttl(Duration::MAX);
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_concurrency_limit_above_semaphore_capacity_is_rejected() {
        let config = EngineConfig::new().with_concurrency_limit(Semaphore::MAX_PERMITS + 1);
        assert_eq!(invalid_field(config), "concurrency_limit");

        let at_limit = EngineConfig::new().with_concurrency_limit(Semaphore::MAX_PERMITS);
        assert!(at_limit.validate().is_ok());
    }
}
