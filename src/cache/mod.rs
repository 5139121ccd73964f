//! Resource caching with TTL/TTI expiry
//!
//! Every remote lookup made during authentication (applications, API keys,
//! accounts, directories) goes through a [`Cache`] region owned by the
//! client's [`CacheManager`]. Entries expire either `ttl` seconds after they
//! were written or `tti` seconds after they were last read, whichever comes
//! first.
//!
//! Store failures never surface to callers: a failing `get` is a miss and a
//! failing write is logged and dropped, so authentication always falls back
//! to the remote API.

mod entry;
mod manager;
#[cfg(feature = "redis")]
mod redis;
mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::clock::SharedClock;

pub use entry::CacheEntry;
pub use manager::{CacheManager, regions};
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use store::{CacheStore, MemoryStore};

/// Default time-to-live in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;
/// Default time-to-idle in seconds
pub const DEFAULT_TTI_SECS: u64 = 300;

/// Options for creating a cache region
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Seconds an entry lives after it is written
    pub ttl: u64,
    /// Seconds an entry lives after it is last read
    pub tti: u64,
    /// Backing store; `None` uses a fresh [`MemoryStore`]
    pub store: Option<Arc<dyn CacheStore>>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL_SECS,
            tti: DEFAULT_TTI_SECS,
            store: None,
        }
    }
}

impl CacheOptions {
    /// Options with the given expiry windows and an in-memory store
    #[must_use]
    pub fn new(ttl: u64, tti: u64) -> Self {
        Self {
            ttl,
            tti,
            store: None,
        }
    }

    /// Use a specific backing store
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    puts: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    size: AtomicU64,
}

impl CacheStats {
    fn put(&self, is_new: bool) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        if is_new {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn expired(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement `size`, saturating at zero.
    fn delete(&self) {
        let _ = self
            .size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |s| {
                Some(s.saturating_sub(1))
            });
    }

    fn clear(&self) {
        self.size.store(0, Ordering::Relaxed);
    }

    /// Calculate hit rate (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStatsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            hits,
            misses,
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
            hit_rate: Self::hit_rate(hits, misses),
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total writes
    pub puts: u64,
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that found an entry but could not use it
    pub misses: u64,
    /// Misses caused by an expired entry
    pub expirations: u64,
    /// Net puts minus deletes
    pub size: u64,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// One cache region: a store plus expiry policy and statistics.
#[derive(Debug)]
pub struct Cache {
    region: String,
    store: Arc<dyn CacheStore>,
    ttl: u64,
    tti: u64,
    clock: SharedClock,
    stats: CacheStats,
}

impl Cache {
    /// Create a region cache
    pub fn new(region: impl Into<String>, options: CacheOptions, clock: SharedClock) -> Self {
        Self {
            region: region.into(),
            store: options
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            ttl: options.ttl,
            tti: options.tti,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Region name
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Time-to-live in seconds
    #[must_use]
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Time-to-idle in seconds
    #[must_use]
    pub fn tti(&self) -> u64 {
        self.tti
    }

    /// Get a cached value if present and not expired.
    ///
    /// A hit refreshes the entry's last-access time in the store. An expired
    /// entry is removed and counted as a miss; an absent key changes no stats.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let entry = match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(region = %self.region, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        let Some(entry) = entry else {
            trace!(region = %self.region, key, "Cache miss");
            return None;
        };

        let now = self.clock.now_millis();
        if entry.is_expired(self.ttl, self.tti, now) {
            debug!(region = %self.region, key, "Cache entry expired");
            self.stats.expired();
            telemetry_metrics::counter!("identity_cache_expirations", "region" => self.region.clone())
                .increment(1);
            self.delete(key).await;
            return None;
        }

        self.stats.hit();
        telemetry_metrics::counter!("identity_cache_hits", "region" => self.region.clone())
            .increment(1);
        if let Err(e) = self.store.touch(key, now).await {
            warn!(region = %self.region, error = %e, "Failed to persist cache touch");
        }
        Some(entry.value)
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// `is_new` controls whether the region's size counter grows; pass
    /// `false` when refreshing a key that is known to be present.
    pub async fn put(&self, key: &str, value: Value, is_new: bool) {
        let entry = CacheEntry::new(value, self.clock.now_millis());
        match self.store.set(key, entry).await {
            Ok(()) => {
                trace!(region = %self.region, key, "Cache put");
                self.stats.put(is_new);
            }
            Err(e) => warn!(region = %self.region, error = %e, "Cache write failed"),
        }
    }

    /// Remove `key`
    pub async fn delete(&self, key: &str) {
        match self.store.delete(key).await {
            Ok(()) => self.stats.delete(),
            Err(e) => warn!(region = %self.region, error = %e, "Cache delete failed"),
        }
    }

    /// Remove all entries
    pub async fn clear(&self) {
        match self.store.clear().await {
            Ok(()) => self.stats.clear(),
            Err(e) => warn!(region = %self.region, error = %e, "Cache clear failed"),
        }
    }

    /// Number of entries held by the store (0 if the store cannot say)
    pub async fn size(&self) -> usize {
        self.store.size().await.unwrap_or_else(|e| {
            warn!(region = %self.region, error = %e, "Cache size failed");
            0
        })
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
