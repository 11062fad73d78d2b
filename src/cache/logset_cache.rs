use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::logset::LogSet;
use crate::observability::metrics::get_metrics;

pub const DEFAULT_CACHE_SIZE: usize = 1000;
pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug)]
struct CacheEntry {
    logset: LogSet,
    last_access: u64,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    access_counter: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    /// Drop `key` if its TTL elapsed. Returns true when the entry is (still) usable.
    fn purge_if_expired(&mut self, key: &str, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                debug!("logset '{}' expired from cache", key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn evict_lru(&mut self) -> Option<String> {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&lru_key);
        Some(lru_key)
    }
}

/// Bounded, TTL-expiring `logset name -> LogSet` map shared by every resolver.
///
/// Reads hand out clones; nothing outside the lock ever holds a reference into an entry.
#[derive(Debug, Clone)]
pub struct LogSetCache {
    inner: Arc<Mutex<CacheState>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl LogSetCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheState::default())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Negative `ttl_seconds` disables expiry.
    pub fn from_settings(capacity: usize, ttl_seconds: i64) -> Self {
        let ttl = u64::try_from(ttl_seconds).ok().map(Duration::from_secs);
        Self::new(capacity, ttl)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the logset, if present and fresh. Counts as an access for LRU ordering.
    pub async fn get(&self, name: &str) -> Option<LogSet> {
        let metrics = get_metrics().await;
        let mut state = self.inner.lock().await;
        if !state.purge_if_expired(name, Instant::now()) {
            metrics.cache_misses.inc();
            metrics.cached_logsets.set(state.entries.len() as i64);
            return None;
        }
        let tick = state.tick();
        let entry = state.entries.get_mut(name)?;
        entry.last_access = tick;
        metrics.cache_hits.inc();
        Some(entry.logset.clone())
    }

    /// Freshness check that does not touch recency.
    pub async fn contains_fresh(&self, name: &str) -> bool {
        let state = self.inner.lock().await;
        state
            .entries
            .get(name)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Insert or wholesale replace a logset, restarting its TTL.
    pub async fn put(&self, name: &str, logset: LogSet) {
        let metrics = get_metrics().await;
        let now = Instant::now();
        let expires_at = self.ttl.map(|ttl| now + ttl);
        let mut state = self.inner.lock().await;
        let tick = state.tick();

        if let Some(entry) = state.entries.get_mut(name) {
            entry.logset = logset;
            entry.last_access = tick;
            entry.expires_at = expires_at;
            return;
        }

        if state.entries.len() >= self.capacity {
            // dead entries give up their slots before any live one is evicted
            state.entries.retain(|_, e| !e.is_expired(now));
        }
        while state.entries.len() >= self.capacity {
            match state.evict_lru() {
                Some(evicted) => {
                    debug!("logset '{}' evicted from cache (capacity {})", evicted, self.capacity);
                    metrics.cache_evictions.inc();
                }
                None => break,
            }
        }
        state.entries.insert(
            name.to_owned(),
            CacheEntry {
                logset,
                last_access: tick,
                expires_at,
            },
        );
        metrics.cached_logsets.set(state.entries.len() as i64);
    }

    /// Mutate a cached logset in place while holding the lock. `None` when the logset is
    /// absent or expired; callers then fall back to a wholesale `put`.
    pub async fn update<F, R>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut LogSet) -> R,
    {
        let mut state = self.inner.lock().await;
        if !state.purge_if_expired(name, Instant::now()) {
            get_metrics().await.cached_logsets.set(state.entries.len() as i64);
            return None;
        }
        let tick = state.tick();
        let entry = state.entries.get_mut(name)?;
        entry.last_access = tick;
        Some(f(&mut entry.logset))
    }

    /// Eagerly drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - state.entries.len();
        get_metrics().await.cached_logsets.set(state.entries.len() as i64);
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for LogSetCache {
    fn default() -> Self {
        Self::from_settings(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL_SECONDS)
    }
}
