//! Storage backends for [`Cache`](super::Cache).
//!
//! The [`CacheStore`] trait abstracts over where entries live. The default
//! implementation is [`MemoryStore`], backed by a `DashMap`. A Redis-backed
//! store is available behind the `redis` feature.

use async_trait::async_trait;
use dashmap::DashMap;

use super::entry::CacheEntry;
use crate::Result;

/// Key → entry table used by a cache region.
///
/// Implementations must be `Send + Sync` because a cache is shared across
/// concurrent authentication calls.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Look up an entry.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Move the last-access time of an existing entry to `now`, leaving its
    /// value and creation time alone. A missing key is not an error.
    async fn touch(&self, key: &str, now: i64) -> Result<()>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn size(&self) -> Result<usize>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn touch(&self, key: &str, now: i64) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.touch(now);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
