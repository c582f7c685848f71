//! The derived-artifact cache.
//!
//! An explicit, constructor-configured object (no process-wide state) so
//! tests and independent consumers each get their own isolated cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use inbox_core::ConfigError;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::freshness::CacheRead;
use super::stats::CacheStats;

/// Configuration for the artifact cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an entry stays valid after it is stored.
    pub ttl: Duration,
    /// Upper bound on the number of entries held at once.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600), // 1 hour
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the max entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("cache.ttl", "must be > 0"));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CacheEntry<A> {
    value: Vec<A>,
    created_at: Instant,
}

#[derive(Debug)]
struct Inner<A> {
    entries: HashMap<String, CacheEntry<A>>,
    stats: CacheStats,
}

/// Memoizes ordered artifact sequences keyed by source identity.
///
/// Internally synchronized; share it behind an `Arc`. Entries are only ever
/// inserted, replaced whole, or removed.
#[derive(Debug)]
pub struct ArtifactCache<A> {
    config: CacheConfig,
    inner: Mutex<Inner<A>>,
}

impl<A: Clone> ArtifactCache<A> {
    /// Create a cache, rejecting a zero TTL or zero capacity.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        })
    }

    /// Create a cache with the default one-hour TTL.
    pub fn with_defaults() -> Self {
        Self {
            config: CacheConfig::default(),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached artifacts for `key` if a valid entry exists.
    ///
    /// A stale entry counts as a miss and is removed by this call.
    pub fn get(&self, key: &str) -> Option<Vec<A>> {
        self.read(key).map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), but also reports the entry's age.
    pub fn read(&self, key: &str) -> Option<CacheRead<Vec<A>>> {
        let now = Instant::now();
        let mut inner = self.lock();

        let created_at = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                trace!(key, "Artifact cache miss");
                return None;
            }
            Some(entry) => entry.created_at,
        };

        if now.saturating_duration_since(created_at) > self.config.ttl {
            inner.entries.remove(key);
            inner.stats.misses += 1;
            inner.stats.expired += 1;
            debug!(key, "Artifact cache entry expired");
            return None;
        }

        inner.stats.hits += 1;
        let value = inner.entries.get(key)?.value.clone();
        Some(CacheRead::new(value, created_at, self.config.ttl))
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: Vec<A>) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
            self.make_room(&mut inner, now);
        }

        debug!(key = %key, artifacts = value.len(), "Artifact cache store");
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
            },
        );
    }

    /// Remove the entry for `key`, or every entry when `key` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, key: Option<&str>) -> usize {
        let mut inner = self.lock();
        let removed = match key {
            Some(key) => usize::from(inner.entries.remove(key).is_some()),
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                count
            }
        };
        debug!(key = ?key, removed, "Artifact cache invalidate");
        removed
    }

    /// Return the cached value, or run `derive` and cache its result.
    ///
    /// A failed derivation stores nothing and hands the error back. The lock
    /// is not held while `derive` runs, so concurrent misses on the same key
    /// may both derive; the last one to finish wins.
    pub async fn get_or_derive<F, Fut, E>(&self, key: &str, derive: F) -> Result<Vec<A>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<A>, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = derive().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entry_count: inner.entries.len() as u64,
            ..inner.stats.clone()
        }
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries first; if still full, evict the oldest.
    fn make_room(&self, inner: &mut Inner<A>, now: Instant) {
        let ttl = self.config.ttl;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) <= ttl);
        inner.stats.expired += (before - inner.entries.len()) as u64;

        while inner.entries.len() >= self.config.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    inner.entries.remove(&key);
                    inner.stats.evictions += 1;
                    debug!(key = %key, "Artifact cache evicted oldest entry");
                }
                None => break,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<A>> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pages(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn short_ttl_cache() -> ArtifactCache<String> {
        ArtifactCache::new(CacheConfig::new().with_ttl(Duration::from_secs(60)))
            .expect("valid config")
    }

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.max_entries, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected_at_construction() {
        let err = ArtifactCache::<String>::new(CacheConfig::new().with_ttl(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_capacity_rejected_at_construction() {
        assert!(ArtifactCache::<String>::new(CacheConfig::new().with_max_entries(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_returns_value() {
        let cache = short_ttl_cache();
        cache.set("doc://a.pdf", pages(&["p1.png", "p2.png"]));
        assert_eq!(cache.get("doc://a.pdf"), Some(pages(&["p1.png", "p2.png"])));
        assert_eq!(cache.get("doc://missing.pdf"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_valid_at_exact_ttl() {
        let cache = short_ttl_cache();
        cache.set("doc://a.pdf", pages(&["p1.png"]));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get("doc://a.pdf").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent_and_not_resurrected() {
        let cache = short_ttl_cache();
        cache.set("doc://a.pdf", pages(&["p1.png"]));
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get("doc://a.pdf"), None);
        assert_eq!(cache.len(), 0, "stale read evicts the entry");
        assert_eq!(cache.get("doc://a.pdf"), None);

        let stats = cache.stats();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_refreshes_created_at() {
        let cache = short_ttl_cache();
        cache.set("doc://a.pdf", pages(&["old.png"]));
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("doc://a.pdf", pages(&["new.png"]));
        tokio::time::advance(Duration::from_secs(50)).await;

        let read = cache.read("doc://a.pdf").expect("entry still valid");
        assert_eq!(read.value(), &pages(&["new.png"]));
        assert_eq!(read.age(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_single_and_all() {
        let cache = short_ttl_cache();
        cache.set("a", pages(&["1"]));
        cache.set("b", pages(&["2"]));
        cache.set("c", pages(&["3"]));

        assert_eq!(cache.invalidate(Some("a")), 1);
        assert_eq!(cache.invalidate(Some("a")), 0);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());

        assert_eq!(cache.invalidate(None), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache: ArtifactCache<String> =
            ArtifactCache::new(CacheConfig::new().with_max_entries(2)).expect("valid config");
        cache.set("a", pages(&["1"]));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("b", pages(&["2"]));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("c", pages(&["3"]));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);

        // Replacing an existing key never evicts.
        cache.set("c", pages(&["3b"]));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_prefers_sweeping_expired() {
        let cache: ArtifactCache<String> = ArtifactCache::new(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(10))
                .with_max_entries(2),
        )
        .expect("valid config");
        cache.set("stale", pages(&["1"]));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("fresh", pages(&["2"]));
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set("new", pages(&["3"]));

        let stats = cache.stats();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.evictions, 0);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_derive_memoizes() {
        let cache = short_ttl_cache();
        let mut calls = 0;

        let first: Result<Vec<String>, String> = cache
            .get_or_derive("doc://a.pdf", || {
                calls += 1;
                async { Ok(pages(&["p1.png"])) }
            })
            .await;
        assert_eq!(first, Ok(pages(&["p1.png"])));

        let second: Result<Vec<String>, String> = cache
            .get_or_derive("doc://a.pdf", || {
                calls += 1;
                async { Ok(pages(&["other.png"])) }
            })
            .await;
        assert_eq!(second, Ok(pages(&["p1.png"])));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_derive_failure_stores_nothing() {
        let cache = short_ttl_cache();
        let result: Result<Vec<String>, String> = cache
            .get_or_derive("doc://broken.pdf", || async {
                Err("render failed".to_string())
            })
            .await;
        assert_eq!(result, Err("render failed".to_string()));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_caches_are_isolated() {
        let a = short_ttl_cache();
        let b = short_ttl_cache();
        a.set("k", pages(&["1"]));
        assert!(b.get("k").is_none());
    }

    proptest! {
        #[test]
        fn invalidate_all_clears_every_key(keys in prop::collection::hash_set("[a-z]{1,8}", 0..20)) {
            let cache: ArtifactCache<u32> = ArtifactCache::with_defaults();
            for key in &keys {
                cache.set(key.clone(), vec![1, 2]);
            }
            prop_assert_eq!(cache.invalidate(None), keys.len());
            for key in &keys {
                prop_assert!(cache.get(key).is_none());
            }
        }
    }
}
