//! End-to-end resource cache tests
//!
//! Tests cover:
//! - TTL and TTI expiry boundaries
//! - Hit bookkeeping and eviction of expired entries
//! - Idle expiry across caches sharing one store
//! - Concurrent reads never undo a newer write

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use identity_client::Result;
use identity_client::cache::{Cache, CacheEntry, CacheOptions, CacheStore, MemoryStore};
use identity_client::clock::{Clock, ManualClock};

/// Memory store whose reads take 50ms
#[derive(Debug, Default)]
struct SlowStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entry = self.inner.get(key).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        entry
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.inner.set(key, entry).await
    }

    async fn touch(&self, key: &str, now: i64) -> Result<()> {
        self.inner.touch(key, now).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn size(&self) -> Result<usize> {
        self.inner.size().await
    }
}

fn cache(region: &str, ttl: u64, tti: u64, clock: &Arc<ManualClock>) -> Cache {
    Cache::new(region, CacheOptions::new(ttl, tti), clock.clone())
}

/// Test the TTL boundary on a never-read entry
#[test]
fn test_entry_expiry_boundaries() {
    let entry = CacheEntry::new(json!("v"), 0);

    assert!(!entry.is_expired(300, 300, 299_000));
    assert!(entry.is_expired(300, 300, 300_000));
    assert!(entry.is_expired(300, 300, 301_000));

    // Idle expiry wins when it is shorter
    assert!(!entry.is_expired(300, 10, 9_999));
    assert!(entry.is_expired(300, 10, 10_000));
}

/// Test that a hit moves last access by the elapsed time
#[tokio::test]
async fn test_hit_updates_last_access() {
    // GIVEN: k → v in a cache sharing a store we can inspect
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(MemoryStore::new());
    let cache = Cache::new(
        "accounts",
        CacheOptions::new(300, 300).with_store(store.clone()),
        clock.clone(),
    );
    cache.put("k", json!("v"), true).await;

    // WHEN: it is read 150 ms later
    clock.advance(Duration::from_millis(150));
    let value = cache.get("k").await;

    // THEN: the hit is counted and the stored entry was touched
    assert_eq!(value, Some(json!("v")));
    assert_eq!(cache.stats().hits, 1);
    let entry = store.get("k").await.unwrap().unwrap();
    assert_eq!(entry.created_at, Some(1_000));
    assert_eq!(entry.last_accessed_at, Some(1_150));
}

/// Test that expired entries are evicted when read
#[tokio::test]
async fn test_expired_entry_is_evicted() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = cache("apiKeys", 300, 5, &clock);
    cache.put("k", json!({"id": 1}), true).await;

    clock.advance(Duration::from_secs(6));
    assert_eq!(cache.get("k").await, None);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.size, 0);

    // The entry is gone, so the next read is a plain miss and counts nothing
    assert_eq!(cache.get("k").await, None);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
}

/// Test that reading an absent key leaves the statistics alone
#[tokio::test]
async fn test_plain_miss_changes_no_stats() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = cache("accounts", 300, 300, &clock);
    let before = cache.stats();

    assert_eq!(cache.get("absent").await, None);
    assert_eq!(cache.stats(), before);
}

/// Test that a put racing a slow read is not overwritten by the read's touch
#[tokio::test]
async fn test_put_during_read_wins() {
    // GIVEN: "k" -> "old" in a store with slow reads
    let clock = Arc::new(ManualClock::new(0));
    let cache = Cache::new(
        "apiKeys",
        CacheOptions::new(300, 300).with_store(Arc::new(SlowStore::default())),
        clock.clone(),
    );
    cache.put("k", json!("old"), true).await;

    // WHEN: "new" is written while a read of "old" is in flight
    let (read, ()) = tokio::join!(cache.get("k"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put("k", json!("new"), false).await;
    });

    // THEN: the in-flight read saw the old value, and the write sticks
    assert_eq!(read, Some(json!("old")));
    assert_eq!(cache.get("k").await, Some(json!("new")));
}

/// Test that a read through one cache keeps the entry alive for another
#[tokio::test]
async fn test_touch_is_shared_through_the_store() {
    // GIVEN: two caches over one store, idle expiry 10s
    let clock = Arc::new(ManualClock::new(0));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let first = Cache::new(
        "accounts",
        CacheOptions::new(100, 10).with_store(store.clone()),
        clock.clone(),
    );
    let second = Cache::new(
        "accounts",
        CacheOptions::new(100, 10).with_store(store),
        clock.clone(),
    );
    first.put("k", json!("v"), true).await;

    // WHEN: the first cache reads at 8s
    clock.advance(Duration::from_secs(8));
    assert!(first.get("k").await.is_some());

    // THEN: the second cache still sees it at 15s (idle for 7s)
    clock.advance(Duration::from_secs(7));
    assert_eq!(second.get("k").await, Some(json!("v")));

    // AND: the absolute lifetime still applies
    clock.set(100_000);
    assert_eq!(second.get("k").await, None);
    assert_eq!(clock.now_secs(), 100);
}
