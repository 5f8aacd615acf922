//! Response cache with TTL expiry and LRU eviction
//!
//! Every operation takes one short lock over the whole map, so a reader can
//! never observe a value that is half-written or being evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CacheConfig;
use crate::transport::AgentResponse;
use crate::types::Fingerprint;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AgentResponse,
    created_at: Instant,
    /// None when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
    last_access: Instant,
    /// Monotonic access sequence; breaks ties between equal instants
    access_seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    seq: u64,
}

impl CacheInner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn evict_lru(&mut self) -> Option<Fingerprint> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_access, entry.access_seq))
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }
}

/// Bounded response cache
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a fresh entry
    pub fn get(&self, key: &Fingerprint) -> Option<AgentResponse> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &Fingerprint, now: Instant) -> Option<AgentResponse> {
        let mut inner = self.lock();
        let seq = inner.next_seq();

        if let Some(entry) = inner.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.last_access = now;
                entry.access_seq = seq;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            inner.entries.remove(key);
            debug!(fingerprint = %key, "Cache entry expired");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite an entry using the configured TTL
    pub fn put(&self, key: Fingerprint, value: AgentResponse) {
        self.put_at(key, value, self.config.ttl, Instant::now());
    }

    /// Insert or overwrite an entry with an explicit TTL
    pub fn put_with_ttl(&self, key: Fingerprint, value: AgentResponse, ttl: Duration) {
        self.put_at(key, value, ttl, Instant::now());
    }

    pub(crate) fn put_at(&self, key: Fingerprint, value: AgentResponse, ttl: Duration, now: Instant) {
        if self.config.capacity == 0 {
            return;
        }

        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.capacity {
            let purged = inner.purge_expired(now);
            if purged == 0 {
                if let Some(victim) = inner.evict_lru() {
                    debug!(fingerprint = %victim, "Evicted least-recently-used cache entry");
                }
            }
        }

        let seq = inner.next_seq();
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now.checked_add(ttl),
                last_access: now,
                access_seq: seq,
            },
        );
    }

    /// Remove one entry; returns whether it was present
    pub fn invalidate(&self, key: &Fingerprint) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Age of an entry, if present (expired entries included)
    pub fn age(&self, key: &Fingerprint) -> Option<Duration> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.created_at.elapsed())
    }

    /// Number of stored entries (expired entries not yet purged included)
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a key is stored (regardless of freshness)
    #[must_use]
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Cache hits since creation
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses since creation
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Configured capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}
