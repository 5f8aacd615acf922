//! Retry logic with exponential backoff
//!
//! Wraps every outbound transport call. Retryable failure classes are
//! absorbed up to the attempt cap; everything else fails on first sight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::stats::EngineStats;
use crate::transport::{AgentResponse, AgentTransport, TransportError, TransportErrorKind};
use crate::types::{ExecutionResult, QueryRequest};

/// Inclusive range of random jitter added to every backoff delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    /// Lower bound
    pub min: Duration,
    /// Upper bound
    pub max: Duration,
}

impl JitterRange {
    /// Create a new jitter range
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No jitter at all
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on the exponential part of the delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Random jitter added on top of the exponential delay
    pub jitter: JitterRange,
    /// Failure classes that trigger a retry
    pub retryable: HashSet<TransportErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: JitterRange::new(Duration::ZERO, Duration::from_millis(100)),
            retryable: [
                TransportErrorKind::Timeout,
                TransportErrorKind::RateLimited,
                TransportErrorKind::ServerUnavailable,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set jitter range
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the set of retryable failure classes
    #[must_use]
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = TransportErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Whether a failure class should be retried
    #[must_use]
    pub fn is_retryable(&self, kind: TransportErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Exponential part of the delay after `attempt` failed (1-based)
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Full delay (backoff plus sampled jitter) after `attempt` failed,
    /// never shorter than the `previous` delay of the same execution
    fn calculate_delay(&self, attempt: u32, previous: Duration) -> Duration {
        (self.backoff_delay(attempt) + self.jitter.sample()).max(previous)
    }
}

/// Executes one request against the transport with bounded retries
pub struct RetryExecutor {
    transport: Arc<dyn AgentTransport>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    stats: Arc<EngineStats>,
}

impl RetryExecutor {
    /// Create a new executor
    #[must_use]
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            transport,
            policy,
            attempt_timeout,
            stats,
        }
    }

    /// Get the retry policy
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a request, retrying transient failures.
    ///
    /// Always returns a well-formed result; a terminal failure is reported in
    /// the result together with the attempt count and the total backoff wait.
    pub async fn execute(&self, request: &QueryRequest) -> ExecutionResult {
        let mut total_wait = Duration::ZERO;
        let mut delay = Duration::ZERO;
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(request).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(
                            query_id = %request.id,
                            attempt = attempt,
                            "Query succeeded after retry"
                        );
                    }
                    return ExecutionResult::succeeded(request, response, attempt, total_wait);
                }
                Err(err) => {
                    let should_retry =
                        attempt < max_attempts && self.policy.is_retryable(err.kind);

                    if !should_retry {
                        debug!(
                            query_id = %request.id,
                            attempt = attempt,
                            error = %err,
                            "Query failed, no more retries"
                        );
                        return ExecutionResult::failed(
                            request,
                            QueryError::Transport(err),
                            attempt,
                            total_wait,
                        );
                    }

                    delay = self.policy.calculate_delay(attempt, delay);
                    warn!(
                        query_id = %request.id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Query failed, retrying"
                    );
                    self.stats.record_retry();
                    sleep(delay).await;
                    total_wait += delay;
                }
            }
        }

        unreachable!("retry loop always returns from its final attempt")
    }

    async fn attempt(&self, request: &QueryRequest) -> Result<AgentResponse, TransportError> {
        self.stats.record_transport_call();
        match timeout(self.attempt_timeout, self.transport.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "attempt exceeded {} ms deadline",
                self.attempt_timeout.as_millis()
            ))),
        }
    }
}
