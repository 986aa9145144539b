//! Process-wide memoization of derived data
//!
//! Entries are keyed by `(namespace, key)` and may carry a time-to-live.
//! The cache is an injected service: components receive an `Arc<Cache<V>>`
//! and nothing reaches it as ambient state.
//!
//! There is no cross-caller locking around computation. Two callers missing
//! the same key concurrently both compute, and the last write wins. A stale
//! entry written by a slow caller stays until the next invalidation or expiry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Key of a cache entry within a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Entry derived from a single record
    Id(i64),
    /// Entry not tied to one record, e.g. a whole tree
    Named(&'static str),
}

impl From<i64> for CacheKey {
    fn from(id: i64) -> Self {
        CacheKey::Id(id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Id(id) => write!(f, "{}", id),
            CacheKey::Named(name) => f.write_str(name),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

type EntryMap<V> = HashMap<(&'static str, CacheKey), CacheEntry<V>>;

/// Namespaced key/value cache with optional expiry
pub struct Cache<V> {
    default_ttl: Option<Duration>,
    entries: RwLock<EntryMap<V>>,
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Cache<V> {
    /// Cache whose entries live until deleted
    pub fn new() -> Self {
        Self::with_default_ttl(None)
    }

    /// Cache applying `ttl` to entries stored without an explicit lifetime
    pub fn with_default_ttl(ttl: Option<Duration>) -> Self {
        Self {
            default_ttl: ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Cached value if present and unexpired. Never computes anything.
    pub fn get(&self, key: impl Into<CacheKey>, namespace: &'static str) -> Option<V> {
        let key = key.into();
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => {
                warn!("Cache lock poisoned, treating {}:{} as a miss", namespace, key);
                return None;
            }
        };

        entries
            .get(&(namespace, key))
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// True if an unexpired entry exists
    pub fn contains(&self, key: impl Into<CacheKey>, namespace: &'static str) -> bool {
        let key = key.into();
        match self.entries.read() {
            Ok(entries) => entries
                .get(&(namespace, key))
                .is_some_and(|entry| !entry.is_expired(Instant::now())),
            Err(_) => false,
        }
    }

    /// Store a value. `ttl = None` applies the cache-wide default.
    ///
    /// A lifetime too long to represent never expires. Expired entries are
    /// replaced on the next `set` of their key or dropped by [`Cache::purge_expired`].
    pub fn set(
        &self,
        key: impl Into<CacheKey>,
        namespace: &'static str,
        value: V,
        ttl: Option<Duration>,
    ) {
        let key = key.into();
        let expires_at = ttl
            .or(self.default_ttl)
            .and_then(|ttl| Instant::now().checked_add(ttl));

        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert((namespace, key), CacheEntry { value, expires_at });
            }
            Err(_) => warn!("Cache lock poisoned, not storing {}:{}", namespace, key),
        }
    }

    /// Cached value, or the result of `compute` which is then stored
    ///
    /// The lock is not held while `compute` runs. A failed computation is
    /// returned to the caller and nothing is stored.
    pub async fn check<F, Fut, E>(
        &self,
        key: impl Into<CacheKey>,
        namespace: &'static str,
        ttl: Option<Duration>,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = key.into();
        if let Some(value) = self.get(key, namespace) {
            debug!("Cache hit {}:{}", namespace, key);
            return Ok(value);
        }

        debug!("Cache miss {}:{}", namespace, key);
        let value = compute().await?;
        self.set(key, namespace, value.clone(), ttl);
        Ok(value)
    }

    /// Remove a single entry. Returns true if something was removed.
    pub fn delete(&self, key: impl Into<CacheKey>, namespace: &'static str) -> bool {
        let key = key.into();
        match self.entries.write() {
            Ok(mut entries) => entries.remove(&(namespace, key)).is_some(),
            Err(_) => {
                warn!("Cache lock poisoned, cannot delete {}:{}", namespace, key);
                false
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired(now));
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        match self.entries.read() {
            Ok(entries) => entries.values().filter(|e| !e.is_expired(now)).count(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NS: &str = "test";

    #[test]
    fn test_get_set_delete() {
        let cache: Cache<String> = Cache::new();
        assert!(cache.get(1, NS).is_none());

        cache.set(1, NS, "one".to_string(), None);
        assert_eq!(cache.get(1, NS).as_deref(), Some("one"));
        assert!(cache.contains(1, NS));

        assert!(cache.delete(1, NS));
        assert!(!cache.delete(1, NS));
        assert!(cache.get(1, NS).is_none());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache: Cache<i64> = Cache::new();
        cache.set(7, "a", 1, None);
        cache.set(7, "b", 2, None);
        cache.set(CacheKey::Named("tree"), "a", 3, None);

        assert_eq!(cache.get(7, "a"), Some(1));
        assert_eq!(cache.get(7, "b"), Some(2));
        assert_eq!(cache.get(CacheKey::Named("tree"), "a"), Some(3));
        assert!(cache.get(CacheKey::Named("tree"), "b").is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache: Cache<i64> = Cache::new();
        cache.set(1, NS, 10, Some(Duration::ZERO));
        cache.set(2, NS, 20, Some(Duration::from_secs(3600)));

        assert!(cache.get(1, NS).is_none());
        assert_eq!(cache.get(2, NS), Some(20));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired_drops_only_stale_entries() {
        let cache: Cache<i64> = Cache::new();
        cache.set(1, NS, 10, Some(Duration::ZERO));
        cache.set(2, NS, 20, None);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get(2, NS), Some(20));
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let cache: Cache<i64> = Cache::with_default_ttl(Some(Duration::MAX));
        cache.set(1, NS, 10, None);
        cache.set(2, NS, 20, Some(Duration::from_secs(u64::MAX)));

        assert_eq!(cache.get(1, NS), Some(10));
        assert_eq!(cache.get(2, NS), Some(20));
    }

    #[test]
    fn test_many_inserts_stay_linear() {
        let cache: Cache<i64> = Cache::with_default_ttl(Some(Duration::from_secs(3600)));
        let started = Instant::now();
        for id in 0..20_000 {
            cache.set(id, NS, id, None);
        }

        assert_eq!(cache.len(), 20_000);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "20k inserts took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_default_ttl_applies() {
        let cache: Cache<i64> = Cache::with_default_ttl(Some(Duration::ZERO));
        cache.set(1, NS, 10, None);
        assert!(cache.get(1, NS).is_none());

        cache.set(2, NS, 20, Some(Duration::from_secs(60)));
        assert_eq!(cache.get(2, NS), Some(20));
    }

    #[tokio::test]
    async fn test_check_computes_once_then_hits() {
        let cache: Cache<i64> = Cache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .check(5, NS, None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(50)
                })
                .await
                .unwrap();
            assert_eq!(value, 50);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_does_not_store_failures() {
        let cache: Cache<i64> = Cache::new();

        let result = cache
            .check(5, NS, None, || async { Err::<i64, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(!cache.contains(5, NS));
    }
}
