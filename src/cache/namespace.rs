//! One TTL'd, size-bounded cache partition
//!
//! Entries expire lazily on read and proactively via [`TtlCache::sweep_expired`].
//! When the partition is full, the least-recently-accessed entry is evicted
//! before a new key goes in. Recency is tracked by `lru::LruCache`; reads
//! promote an entry, sweeps do not.

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Counters and sizing of one namespace
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NamespaceStats {
    pub name: String,
    pub size: usize,
    pub max_size: usize,
    pub ttl: Duration,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub hit_rate: f64,
}

/// Size-bounded cache whose entries live for at most `ttl`
#[derive(Debug)]
pub struct TtlCache<V> {
    name: String,
    ttl: Duration,
    max_size: usize,
    entries: Mutex<LruCache<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// # Errors
    /// Returns a validation error when `max_size` is zero.
    pub fn new(name: impl Into<String>, max_size: usize, ttl: Duration) -> PipelineResult<Self> {
        let name = name.into();
        let capacity = NonZeroUsize::new(max_size).ok_or_else(|| {
            PipelineError::validation(format!("cache namespace '{name}' needs max_size >= 1"))
        })?;

        Ok(Self {
            name,
            ttl,
            max_size,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, counting a hit or a miss
    ///
    /// An expired entry is dropped and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` under `key` with a fresh timestamp
    ///
    /// Evicts exactly one least-recently-accessed entry when a new key arrives
    /// at a full namespace.
    pub fn insert(&self, key: String, value: V) {
        let mut entries = self.entries.lock();

        if !entries.contains(&key) && entries.len() >= self.max_size {
            if let Some((evicted, _)) = entries.pop_lru() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Cache '{}' evicted LRU entry {evicted}", self.name);
            }
        }

        entries.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove one entry, returning whether it was present
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Drop every entry immediately
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Purge every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        let removed = expired.len();
        if removed > 0 {
            self.expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(
                "Cache '{}' swept {removed} expired entries ({} remain)",
                self.name,
                entries.len()
            );
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> NamespaceStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        NamespaceStats {
            name: self.name.clone(),
            size: self.len(),
            max_size: self.max_size,
            ttl: self.ttl,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize) -> TtlCache<String> {
        TtlCache::new("test", max_size, Duration::from_secs(60)).expect("valid cache")
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(TtlCache::<String>::new("empty", 0, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache(4);
        cache.insert("k".to_string(), "v".to_string());
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("other"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = cache(4);
        cache.insert("k".to_string(), "v".to_string());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_full_namespace_evicts_least_recently_accessed() {
        let cache = cache(3);
        cache.insert("a".to_string(), "1".to_string());
        cache.insert("b".to_string(), "2".to_string());
        cache.insert("c".to_string(), "3".to_string());

        // Touch "a" so "b" becomes the least recently accessed
        assert!(cache.get("a").is_some());
        cache.insert("d".to_string(), "4".to_string());

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = cache(2);
        cache.insert("a".to_string(), "1".to_string());
        cache.insert("b".to_string(), "2".to_string());
        cache.insert("a".to_string(), "updated".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a"), Some("updated".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = cache(8);
        cache.insert("old".to_string(), "1".to_string());
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("new".to_string(), "2".to_string());
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }
}
