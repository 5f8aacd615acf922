//! Application configuration types
//!
//! TOML-facing mirror of [`EngineConfig`] plus the transport and detector
//! settings the binary needs.

use std::time::Duration;

use cascade_core::{EngineConfig, JitterRange, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub detector: DetectorSection,
}

/// Engine configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Maximum cached responses (0 disables caching)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Follow-up budget per batch request (0 = unlimited)
    #[serde(default = "default_max_derived_per_root")]
    pub max_derived_per_root: usize,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_depth: default_max_depth(),
            max_derived_per_root: default_max_derived_per_root(),
            concurrency_limit: default_concurrency_limit(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry: RetrySection::default(),
        }
    }
}

fn default_cache_capacity() -> usize {
    256
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_derived_per_root() -> usize {
    32
}
fn default_concurrency_limit() -> usize {
    4
}
fn default_attempt_timeout_secs() -> u64 {
    30
}

/// Retry configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_min_ms: 0,
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter_max_ms() -> u64 {
    100
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Client-side request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/query".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

/// Which follow-up detector to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Marker,
    None,
}

/// Follow-up detector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorSection {
    #[serde(default)]
    pub kind: DetectorKind,
}

impl EngineSection {
    /// Convert into the core engine configuration
    pub fn to_engine_config(&self) -> EngineConfig {
        let retry = &self.retry;
        let policy = RetryPolicy::default()
            .with_max_attempts(retry.max_attempts)
            .with_base_delay(Duration::from_millis(retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(retry.max_delay_ms))
            .with_multiplier(retry.multiplier)
            .with_jitter(JitterRange::new(
                Duration::from_millis(retry.jitter_min_ms),
                Duration::from_millis(retry.jitter_max_ms),
            ));

        EngineConfig::default()
            .with_cache_capacity(self.cache_capacity)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_retry(policy)
            .with_max_depth(self.max_depth)
            .with_max_derived_per_root((self.max_derived_per_root > 0).then_some(self.max_derived_per_root))
            .with_concurrency_limit(self.concurrency_limit)
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
    }
}
