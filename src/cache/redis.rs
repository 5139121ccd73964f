//! Redis-backed [`CacheStore`].
//!
//! Entries are stored as JSON strings under `{namespace}:{key}`. Reads go
//! through [`CacheEntry::parse`], so entries written by other clients with
//! ISO-8601 timestamps are accepted. Touches run as a server-side script so
//! a concurrent `set` is never overwritten with an older value.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::entry::CacheEntry;
use super::store::CacheStore;
use crate::{Error, Result};

const TOUCH_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local entry = cjson.decode(raw)
local now = tonumber(ARGV[1])
if type(entry.lastAccessedAt) ~= 'number' or entry.lastAccessedAt < now then
  entry.lastAccessedAt = now
end
redis.call('SET', KEYS[1], cjson.encode(entry))
return 1
";

/// Out-of-process cache store
#[derive(Clone, Debug)]
pub struct RedisStore {
    client: redis::Client,
    namespace: String,
}

impl RedisStore {
    /// Store keys under `namespace` (normally the region name)
    pub fn new(client: redis::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)
    }

    async fn namespaced_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        conn.keys(format!("{}:*", self.namespace))
            .await
            .map_err(redis_error)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(key)).await.map_err(redis_error)?;

        match raw {
            Some(json) => {
                let value: serde_json::Value = serde_json::from_str(&json)?;
                Ok(Some(CacheEntry::parse(&value)))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.key(key), payload)
            .await
            .map_err(redis_error)
    }

    async fn touch(&self, key: &str, now: i64) -> Result<()> {
        let script = redis::Script::new(TOUCH_SCRIPT);
        let mut conn = self.connection().await?;
        let _touched: i64 = script
            .key(self.key(key))
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.key(key)).await.map_err(redis_error)
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.namespaced_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(keys).await.map_err(redis_error)
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.namespaced_keys().await?.len())
    }
}

fn redis_error(e: redis::RedisError) -> Error {
    Error::Cache(format!("redis: {e}"))
}
