//! Engine facade
//!
//! Composes the cache, scheduler, retry executor and follow-up expander
//! behind three calls: [`Engine::submit`], [`Engine::drain`] and
//! [`Engine::stats`].
//!
//! There is one scheduler per engine, shared by every caller. Each in-flight
//! `submit` (and `drain`) pumps that scheduler until it has what it needs, so
//! a call may execute work that belongs to another caller. Admission is
//! bounded by a semaphore: a call-chain must hold a permit to take work and
//! execute it. Locks are only ever held between suspension points, never
//! across an `.await`.
//!
//! Lock order, where more than one is held: scheduler, then tracker.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::expander::{FollowUpDetector, FollowUpExpander};
use crate::retry::RetryExecutor;
use crate::scheduler::Scheduler;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::transport::AgentTransport;
use crate::types::{ExecutionResult, Fingerprint, QueryContext, QueryId, QueryRequest, QueryState};

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: QueryState,
    /// The caller already looked the fingerprint up before scheduling
    cache_checked: bool,
}

#[derive(Default)]
struct Tracker {
    slots: HashMap<QueryId, Slot>,
    waiters: HashMap<QueryId, oneshot::Sender<ExecutionResult>>,
    /// In-flight requests whose result must be discarded
    cancelled: HashSet<QueryId>,
    /// Results nobody is waiting for, retained until `drain` takes them
    unclaimed: Vec<ExecutionResult>,
}

impl Tracker {
    fn deliver(&mut self, result: ExecutionResult) {
        self.slots.remove(&result.query_id);
        match self.waiters.remove(&result.query_id) {
            Some(tx) => {
                if let Err(result) = tx.send(result) {
                    debug!(query_id = %result.query_id, "Caller went away, result dropped");
                }
            }
            None => self.unclaimed.push(result),
        }
    }
}

/// Query scheduling and resilience engine
pub struct Engine {
    config: EngineConfig,
    cache: ResponseCache,
    scheduler: Mutex<Scheduler>,
    tracker: Mutex<Tracker>,
    executor: RetryExecutor,
    expander: FollowUpExpander,
    stats: Arc<EngineStats>,
    admission: Semaphore,
    progress: Notify,
    closed: AtomicBool,
}

impl Engine {
    /// Create a new engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration does not validate.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn AgentTransport>,
        detector: Arc<dyn FollowUpDetector>,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(EngineStats::default());
        let executor = RetryExecutor::new(
            transport,
            config.retry.clone(),
            config.attempt_timeout,
            stats.clone(),
        );
        let expander = FollowUpExpander::new(detector, config.max_derived_per_root);

        info!(
            cache_capacity = config.cache.capacity,
            cache_ttl_secs = config.cache.ttl.as_secs(),
            max_depth = config.max_depth,
            max_attempts = config.retry.max_attempts,
            concurrency_limit = config.concurrency_limit,
            "Query engine initialized"
        );

        Ok(Self {
            cache: ResponseCache::new(config.cache.clone()),
            scheduler: Mutex::new(Scheduler::new(config.max_depth)),
            tracker: Mutex::new(Tracker::default()),
            executor,
            expander,
            stats,
            admission: Semaphore::new(config.concurrency_limit),
            progress: Notify::new(),
            closed: AtomicBool::new(false),
            config,
        })
    }

    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a query and wait for its result.
    ///
    /// A fresh cached response is returned immediately. Otherwise the query
    /// is queued as batch work and this call pumps the shared scheduler until
    /// the query's own result is available; follow-ups it spawns stay on the
    /// stack for the next pump. Never fails: errors are reported inside the
    /// result.
    ///
    /// Results of those follow-ups are held by the engine until a
    /// [`Engine::drain`] hands them out. Callers that only ever `submit`
    /// should drain periodically, or watch [`Engine::unclaimed`].
    pub async fn submit(&self, text: impl Into<String>, context: QueryContext) -> ExecutionResult {
        let request = QueryRequest::batch(text, context);
        self.stats.record_submitted();

        if self.is_closed() {
            self.stats.record_failure();
            return ExecutionResult::rejected(&request, QueryError::Shutdown);
        }

        if let Some(response) = self.cache.get(&request.fingerprint()) {
            self.stats.record_cache_hit();
            debug!(query_id = %request.id, "Query served from cache");
            return ExecutionResult::cached(&request, response);
        }
        self.stats.record_cache_miss();

        let (tx, mut rx) = oneshot::channel();
        self.schedule_batch(request.clone(), Some(tx), true);
        self.pump_until(&request, &mut rx).await
    }

    /// Queue a query without pumping the scheduler.
    ///
    /// The result is returned by a later [`Engine::drain`] (or produced by
    /// whichever `submit` happens to pump it).
    pub fn enqueue(&self, text: impl Into<String>, context: QueryContext) -> QueryId {
        let request = QueryRequest::batch(text, context);
        let id = request.id;
        self.stats.record_submitted();

        if self.is_closed() {
            self.stats.record_failure();
            self.tracker()
                .unclaimed
                .push(ExecutionResult::rejected(&request, QueryError::Shutdown));
            return id;
        }

        self.schedule_batch(request, None, false);
        id
    }

    /// Pump the scheduler until nothing is pending or in flight.
    ///
    /// Returns every result that no `submit` call was waiting for (follow-ups,
    /// enqueued batch work and rejected follow-ups), in completion order.
    pub async fn drain(&self) -> Vec<ExecutionResult> {
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);

            if self.scheduler().is_idle() {
                break;
            }

            let permit = match self.admission.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Closed: wait for in-flight work elsewhere to settle
                    notified.await;
                    continue;
                }
            };

            match self.take_next() {
                Some((request, cache_checked)) => {
                    self.run(request, cache_checked).await;
                    drop(permit);
                }
                None => {
                    drop(permit);
                    notified.await;
                }
            }
        }

        std::mem::take(&mut self.tracker().unclaimed)
    }

    /// Cancel a request that has not completed yet.
    ///
    /// A pending request is removed from the scheduler and resolves as
    /// cancelled right away. An in-flight request runs to completion, but its
    /// result is replaced by a cancellation. Returns false for unknown or
    /// already finished requests.
    pub fn cancel(&self, id: QueryId) -> bool {
        let mut scheduler = self.scheduler();
        let mut tracker = self.tracker();

        if let Some(request) = scheduler.remove(id) {
            drop(scheduler);
            self.expander.settle(&request);
            self.stats.record_cancelled();
            tracker.deliver(ExecutionResult::rejected(&request, QueryError::Cancelled));
            drop(tracker);
            info!(query_id = %id, "Pending query cancelled");
            self.progress.notify_waiters();
            return true;
        }

        let in_flight = matches!(
            tracker.slots.get(&id),
            Some(Slot {
                state: QueryState::InFlight,
                ..
            })
        );
        if in_flight && tracker.cancelled.insert(id) {
            self.stats.record_cancelled();
            info!(query_id = %id, "In-flight query cancelled, result will be discarded");
            return true;
        }
        false
    }

    /// Current state of a pending or in-flight request
    #[must_use]
    pub fn state(&self, id: QueryId) -> Option<QueryState> {
        self.tracker().slots.get(&id).map(|slot| slot.state)
    }

    /// Snapshot of the statistics counters
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Reset the statistics counters
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Drop one cached response, or all of them
    pub fn invalidate_cache(&self, fingerprint: Option<&Fingerprint>) {
        match fingerprint {
            Some(key) => {
                if self.cache.invalidate(key) {
                    debug!(fingerprint = %key, "Cache entry invalidated");
                }
            }
            None => {
                self.cache.clear();
                info!("Response cache cleared");
            }
        }
    }

    /// Cache key the engine would use for a query
    #[must_use]
    pub fn fingerprint(&self, text: &str, context: &QueryContext) -> Fingerprint {
        Fingerprint::compute(text, context)
    }

    /// Access the response cache
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Nothing pending and nothing in flight
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler().is_idle()
    }

    /// Batch and follow-up requests waiting to run
    #[must_use]
    pub fn pending(&self) -> usize {
        let scheduler = self.scheduler();
        scheduler.queued_len() + scheduler.stacked_len()
    }

    /// Results held for the next [`Engine::drain`]
    #[must_use]
    pub fn unclaimed(&self) -> usize {
        self.tracker().unclaimed.len()
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether [`Engine::close`] was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop admitting work.
    ///
    /// Pending requests resolve with `QueryError::Shutdown`; in-flight
    /// requests finish normally.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.admission.close();

        let mut scheduler = self.scheduler();
        let pending = scheduler.drain_pending();
        let mut tracker = self.tracker();
        for request in &pending {
            self.expander.settle(request);
            self.stats.record_failure();
            tracker.deliver(ExecutionResult::rejected(request, QueryError::Shutdown));
        }
        drop(tracker);
        drop(scheduler);

        info!(dropped = pending.len(), "Query engine closed");
        self.progress.notify_waiters();
    }

    fn schedule_batch(
        &self,
        request: QueryRequest,
        waiter: Option<oneshot::Sender<ExecutionResult>>,
        cache_checked: bool,
    ) {
        let id = request.id;
        self.expander.track_root(request.root_id);

        let mut scheduler = self.scheduler();
        let mut tracker = self.tracker();
        tracker.slots.insert(
            id,
            Slot {
                state: QueryState::Pending,
                cache_checked,
            },
        );
        if let Some(tx) = waiter {
            tracker.waiters.insert(id, tx);
        }
        scheduler.enqueue_batch(request);
        drop(tracker);
        drop(scheduler);

        self.progress.notify_waiters();
    }

    fn take_next(&self) -> Option<(QueryRequest, bool)> {
        let mut scheduler = self.scheduler();
        let request = scheduler.next()?;
        let mut tracker = self.tracker();
        let slot = tracker.slots.entry(request.id).or_insert(Slot {
            state: QueryState::Pending,
            cache_checked: false,
        });
        slot.state = QueryState::InFlight;
        let cache_checked = slot.cache_checked;
        Some((request, cache_checked))
    }

    async fn pump_until(
        &self,
        request: &QueryRequest,
        rx: &mut oneshot::Receiver<ExecutionResult>,
    ) -> ExecutionResult {
        let shutdown = || ExecutionResult::rejected(request, QueryError::Shutdown);

        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);

            let permit = tokio::select! {
                biased;
                result = &mut *rx => return result.unwrap_or_else(|_| shutdown()),
                permit = self.admission.acquire() => permit,
            };

            let Ok(permit) = permit else {
                // Closed: our request was either dropped with a Shutdown
                // result or is finishing elsewhere.
                return (&mut *rx).await.unwrap_or_else(|_| shutdown());
            };

            match self.take_next() {
                Some((next, cache_checked)) => {
                    self.run(next, cache_checked).await;
                    drop(permit);
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        biased;
                        result = &mut *rx => return result.unwrap_or_else(|_| shutdown()),
                        _ = &mut notified => {}
                    }
                }
            }
        }
    }

    async fn run(&self, request: QueryRequest, cache_checked: bool) {
        let cached = if cache_checked {
            None
        } else {
            let hit = self.cache.get(&request.fingerprint());
            if hit.is_some() {
                self.stats.record_cache_hit();
            } else {
                self.stats.record_cache_miss();
            }
            hit
        };

        let result = match cached {
            Some(response) => ExecutionResult::cached(&request, response),
            None => {
                debug!(
                    query_id = %request.id,
                    depth = request.depth,
                    mode = ?request.mode,
                    "Executing query"
                );
                self.executor.execute(&request).await
            }
        };

        self.complete(request, result);
    }

    fn complete(&self, request: QueryRequest, result: ExecutionResult) {
        let mut scheduler = self.scheduler();
        let mut tracker = self.tracker();

        if tracker.cancelled.remove(&request.id) {
            scheduler.complete();
            drop(scheduler);
            self.expander.settle(&request);
            tracker.deliver(ExecutionResult::failed(
                &request,
                QueryError::Cancelled,
                result.attempts,
                result.total_wait,
            ));
            drop(tracker);
            self.progress.notify_waiters();
            return;
        }

        let mut rejected = Vec::new();
        match (&result.response, result.success) {
            (Some(response), true) => {
                if !result.served_from_cache {
                    self.stats.record_success();
                    self.cache.put(result.fingerprint.clone(), response.clone());

                    // Admission is closed; children pushed now would never run
                    if self.is_closed() {
                        debug!(query_id = %request.id, "Engine closed, follow-ups skipped");
                    } else {
                        let outcome = self.expander.expand(&request, response, &mut scheduler);
                        for id in &outcome.scheduled {
                            self.stats.record_expansion();
                            tracker.slots.insert(
                                *id,
                                Slot {
                                    state: QueryState::Pending,
                                    cache_checked: false,
                                },
                            );
                        }
                        if !outcome.scheduled.is_empty() {
                            debug!(
                                query_id = %request.id,
                                follow_ups = outcome.scheduled.len(),
                                "Follow-up queries scheduled"
                            );
                        }
                        rejected = outcome.rejected;
                    }
                }
            }
            _ => {
                self.stats.record_failure();
                warn!(
                    query_id = %request.id,
                    attempts = result.attempts,
                    error = ?result.error_class(),
                    "Query failed"
                );
            }
        }

        scheduler.complete();
        drop(scheduler);
        self.expander.settle(&request);
        tracker.deliver(result);

        for (child, err) in rejected {
            match err {
                QueryError::DepthExceeded { .. } => self.stats.record_depth_rejection(),
                QueryError::ExpansionLimitExceeded { .. } => self.stats.record_expansion_limit(),
                _ => {}
            }
            self.stats.record_failure();
            tracker.deliver(ExecutionResult::rejected(&child, err));
        }
        drop(tracker);

        self.progress.notify_waiters();
    }
}
