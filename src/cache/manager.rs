//! Namespaced memoization in front of remote calls
//!
//! Keys are derived from `(operation, params)` so callers never build key
//! strings by hand. Params go through `serde_json::Value` first, whose maps
//! are ordered, which makes the key independent of struct field or hash map
//! iteration order.

use log::{debug, info};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use xxhash_rust::xxh3::xxh3_128;

use super::namespace::{NamespaceStats, TtlCache};
use crate::config::CacheConfig;
use crate::error::PipelineResult;

/// Independently sized and TTL'd cache partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Transformer output (translations, synthesized speech references)
    Translation,
    /// Raw responses from remote APIs
    ApiResponse,
    /// Fetched chapter content
    Content,
}

impl CacheNamespace {
    pub const ALL: [Self; 3] = [Self::Translation, Self::ApiResponse, Self::Content];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::ApiResponse => "api_response",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key for `(operation, params)`
///
/// # Errors
/// Fails only if `params` cannot be represented as JSON.
pub fn cache_key<P: Serialize + ?Sized>(operation: &str, params: &P) -> PipelineResult<String> {
    let params = serde_json::to_value(params)?;
    let canonical = serde_json::to_string(&(operation, params))?;
    Ok(format!("{operation}:{:032x}", xxh3_128(canonical.as_bytes())))
}

/// Snapshot of every namespace
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub namespaces: Vec<NamespaceStats>,
    pub total_entries: usize,
    pub total_hits: u64,
    pub total_misses: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.total_hits + self.total_misses;
        if lookups == 0 {
            0.0
        } else {
            self.total_hits as f64 / lookups as f64
        }
    }
}

/// Shared cache service holding one [`TtlCache`] per namespace
#[derive(Debug)]
pub struct CacheManager {
    translation: TtlCache<Value>,
    api_response: TtlCache<Value>,
    content: TtlCache<Value>,
    sweep_interval: Duration,
}

impl CacheManager {
    /// # Errors
    /// Returns a validation error for an invalid config.
    pub fn new(config: &CacheConfig) -> PipelineResult<Self> {
        config.validate()?;
        let namespace = |ns: CacheNamespace, size: usize, ttl: Duration| {
            TtlCache::new(ns.as_str(), size, ttl)
        };

        Ok(Self {
            translation: namespace(
                CacheNamespace::Translation,
                config.translation.max_size,
                config.translation.ttl(),
            )?,
            api_response: namespace(
                CacheNamespace::ApiResponse,
                config.api_response.max_size,
                config.api_response.ttl(),
            )?,
            content: namespace(
                CacheNamespace::Content,
                config.content.max_size,
                config.content.ttl(),
            )?,
            sweep_interval: config.sweep_interval(),
        })
    }

    #[must_use]
    pub fn namespace(&self, namespace: CacheNamespace) -> &TtlCache<Value> {
        match namespace {
            CacheNamespace::Translation => &self.translation,
            CacheNamespace::ApiResponse => &self.api_response,
            CacheNamespace::Content => &self.content,
        }
    }

    /// Cached value for `(operation, params)`, `None` on a miss or expiry
    pub fn get<P: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        operation: &str,
        params: &P,
    ) -> PipelineResult<Option<Value>> {
        let key = cache_key(operation, params)?;
        Ok(self.namespace(namespace).get(&key))
    }

    pub fn set<P: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        operation: &str,
        params: &P,
        value: Value,
    ) -> PipelineResult<()> {
        let key = cache_key(operation, params)?;
        self.namespace(namespace).insert(key, value);
        Ok(())
    }

    /// Typed lookup; an entry that no longer deserializes as `T` counts as a miss
    pub fn get_as<T, P>(
        &self,
        namespace: CacheNamespace,
        operation: &str,
        params: &P,
    ) -> PipelineResult<Option<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let Some(value) = self.get(namespace, operation, params)? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                debug!("Discarding {namespace} entry for {operation}: {e}");
                Ok(None)
            }
        }
    }

    pub fn set_as<T, P>(
        &self,
        namespace: CacheNamespace,
        operation: &str,
        params: &P,
        value: &T,
    ) -> PipelineResult<()>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        self.set(namespace, operation, params, serde_json::to_value(value)?)
    }

    pub fn clear_namespace(&self, namespace: CacheNamespace) {
        self.namespace(namespace).clear();
        info!("Cleared cache namespace {namespace}");
    }

    pub fn clear_all(&self) {
        for namespace in CacheNamespace::ALL {
            self.namespace(namespace).clear();
        }
        info!("Cleared all cache namespaces");
    }

    /// Purge expired entries from every namespace
    pub fn sweep_expired(&self) -> usize {
        CacheNamespace::ALL
            .into_iter()
            .map(|ns| self.namespace(ns).sweep_expired())
            .sum()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let namespaces: Vec<NamespaceStats> = CacheNamespace::ALL
            .into_iter()
            .map(|ns| self.namespace(ns).stats())
            .collect();

        CacheStats {
            total_entries: namespaces.iter().map(|s| s.size).sum(),
            total_hits: namespaces.iter().map(|s| s.hits).sum(),
            total_misses: namespaces.iter().map(|s| s.misses).sum(),
            namespaces,
        }
    }

    /// Start the periodic expiry sweep
    ///
    /// The task holds only a weak reference and exits once the manager is
    /// dropped. Abort the returned handle to stop it earlier.
    pub fn start_sweep_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Cache manager dropped, stopping sweep task");
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!("Cache sweep removed {removed} expired entries");
                }
            }
        })
    }
}
