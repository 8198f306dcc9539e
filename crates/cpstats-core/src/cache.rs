//! In-memory caching for normalized profiles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::deadline;

/// Default time-to-live for cached profiles.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Defines how a lookup interacts with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present;
    /// otherwise fetch from the source and write the result. (Default)
    #[default]
    Use,
    /// Always fetch from the source, skipping any cached entry,
    /// and write the fresh result.
    Refresh,
    /// Always fetch from the source and neither read nor write the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
}

/// Thread-safe TTL cache keyed by `platform:username`.
///
/// Expired entries are evicted on the read that observes them; an optional
/// [`CacheStore::clear_expired`] sweep removes the rest.
#[derive(Debug)]
pub struct CacheStore<V> {
    inner: Arc<tokio::sync::RwLock<CacheInner<V>>>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> {
    /// Create a new cache store with a default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
        }
    }

    /// Create a cache store with the 15 minute default TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }

    /// Create a disabled cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the cached value if it has not expired.
    ///
    /// An expired entry is removed before reporting the miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let store = self.inner.read().await;
            match store.map.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        // Another writer may have refreshed the entry between the two locks.
        match store.map.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Some(entry.value.clone()),
            Some(_) => {
                store.map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Overwrites `key`, resetting its expiry to `now + ttl`.
    ///
    /// `ttl_override` replaces the default TTL for this entry. A disabled
    /// cache ignores the write.
    pub async fn put(&self, key: impl Into<String>, value: V, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;
        let ttl = ttl_override.unwrap_or(store.default_ttl);
        if store.default_ttl.is_zero() || ttl.is_zero() {
            return;
        }

        let expires_at = deadline(Instant::now(), ttl);
        store
            .map
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let mut store = self.inner.write().await;
        let now = Instant::now();
        let before = store.map.len();
        store.map.retain(|_, entry| entry.is_live(now));
        before - store.map.len()
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        let mut store = self.inner.write().await;
        store.map.remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        let store = self.inner.read().await;
        store.default_ttl.is_zero()
    }

    pub async fn default_ttl(&self) -> Duration {
        let store = self.inner.read().await;
        store.default_ttl
    }
}
