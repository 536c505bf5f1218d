//! TTL cache with per-namespace sizing and LRU eviction

pub mod manager;
pub mod namespace;

pub use manager::{CacheManager, CacheNamespace, CacheStats, cache_key};
pub use namespace::{NamespaceStats, TtlCache};
