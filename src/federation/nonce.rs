//! Single-use nonce tracking for federation callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{Cache, regions};
use crate::client::Client;
use crate::{Error, Result};

/// Remembers consumed callback nonces
#[async_trait]
pub trait NonceStore: Send + Sync + std::fmt::Debug {
    /// `true` if `nonce` was recorded before
    async fn exists(&self, nonce: &str) -> Result<bool>;

    /// Record `nonce`
    async fn put(&self, nonce: &str) -> Result<()>;
}

/// Nonce store backed by the `idSiteNonces` cache region.
///
/// Nonces live as long as the region's expiry allows, which must exceed the
/// lifetime of the callback tokens.
#[derive(Debug, Clone)]
pub struct CacheNonceStore {
    cache: Arc<Cache>,
}

impl CacheNonceStore {
    /// Store writing into `cache`
    #[must_use]
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    /// Store using the client's `idSiteNonces` region
    pub fn for_client(client: &Client) -> Result<Self> {
        client
            .cache_manager()
            .get(regions::ID_SITE_NONCES)
            .map(Self::new)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "cache region {} has not been created",
                    regions::ID_SITE_NONCES
                ))
            })
    }
}

#[async_trait]
impl NonceStore for CacheNonceStore {
    async fn exists(&self, nonce: &str) -> Result<bool> {
        Ok(self.cache.get(nonce).await.is_some())
    }

    async fn put(&self, nonce: &str) -> Result<()> {
        self.cache
            .put(nonce, Value::String(nonce.to_string()), true)
            .await;
        Ok(())
    }
}
