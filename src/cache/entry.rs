//! Timestamped cache entries with TTL/TTI expiry.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A cached JSON value together with its creation and last-access times.
///
/// Timestamps are epoch milliseconds. They are optional only because
/// [`CacheEntry::parse`] is permissive about what it reads back from a store;
/// an entry with an unknown timestamp is always considered expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The cached value
    pub value: Value,
    /// When the entry was written
    pub created_at: Option<i64>,
    /// When the entry was last read
    pub last_accessed_at: Option<i64>,
}

impl CacheEntry {
    /// Fresh entry; both timestamps are `now`.
    #[must_use]
    pub fn new(value: Value, now: i64) -> Self {
        Self {
            value,
            created_at: Some(now),
            last_accessed_at: Some(now),
        }
    }

    /// Entry with explicit timestamps, each defaulting to `now` when omitted.
    /// Last access is never earlier than creation.
    #[must_use]
    pub fn with_timestamps(
        value: Value,
        created_at: Option<i64>,
        last_accessed_at: Option<i64>,
        now: i64,
    ) -> Self {
        let created_at = created_at.unwrap_or(now);
        Self {
            value,
            created_at: Some(created_at),
            last_accessed_at: Some(last_accessed_at.unwrap_or(now).max(created_at)),
        }
    }

    /// Build an entry from a JSON object `{value, createdAt?, lastAccessedAt?}`.
    ///
    /// Timestamps that are present must be numbers; anything else is a
    /// construction error.
    pub fn from_value(data: &Value, now: i64) -> Result<Self> {
        let object = data
            .as_object()
            .ok_or_else(|| Error::Cache("cache entry must be a JSON object".to_string()))?;

        let timestamp = |field: &str| -> Result<Option<i64>> {
            match object.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .map(Some)
                    .ok_or_else(|| Error::Cache(format!("{field} must be a number"))),
            }
        };

        let created_at = timestamp("createdAt")?;
        let last_accessed_at = timestamp("lastAccessedAt")?;
        let value = object.get("value").cloned().unwrap_or(Value::Null);

        Ok(Self::with_timestamps(value, created_at, last_accessed_at, now))
    }

    /// Reconstruct an entry read back from a store.
    ///
    /// Dates may be epoch milliseconds or RFC 3339 strings. Unparsable dates
    /// become `None` rather than an error.
    #[must_use]
    pub fn parse(data: &Value) -> Self {
        let timestamp = |field: &str| -> Option<i64> {
            match data.get(field)? {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|d| d.timestamp_millis()),
                _ => None,
            }
        };

        Self {
            value: data.get("value").cloned().unwrap_or(Value::Null),
            created_at: timestamp("createdAt"),
            last_accessed_at: timestamp("lastAccessedAt"),
        }
    }

    /// Record a read at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_accessed_at = Some(match self.last_accessed_at {
            Some(last) => last.max(now),
            None => now,
        });
    }

    /// `true` once the entry outlived `ttl` seconds since creation or `tti`
    /// seconds since last access.
    #[must_use]
    pub fn is_expired(&self, ttl_secs: u64, tti_secs: u64, now: i64) -> bool {
        let (Some(created_at), Some(last_accessed_at)) = (self.created_at, self.last_accessed_at)
        else {
            return true;
        };

        let ttl_ms = secs_to_millis(ttl_secs);
        let tti_ms = secs_to_millis(tti_secs);

        now >= created_at.saturating_add(ttl_ms) || now >= last_accessed_at.saturating_add(tti_ms)
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}
