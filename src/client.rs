//! The client context.
//!
//! A [`Client`] is built explicitly and passed to every authenticator. It
//! owns the tenant API key, the data store and the [`CacheManager`]; there is
//! no process-wide client.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheManager, regions};
use crate::clock::{self, SharedClock};
use crate::config::{AuthenticationConfig, CacheConfig, Config, DEFAULT_BASE_URL};
use crate::datastore::{Body, CachingDataStore, DataStore, HttpDataStore, RequestOptions};
use crate::resource::{Account, ApiKey, Application, Collection, Directory};
use crate::{Error, Result};

struct Inner {
    base_url: String,
    api_key_id: String,
    api_key_secret: String,
    data_store: Arc<dyn DataStore>,
    caches: Arc<CacheManager>,
    clock: SharedClock,
    authentication: AuthenticationConfig,
}

/// Handle to the identity API. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("api_key_id", &self.inner.api_key_id)
            .field("regions", &self.inner.caches.regions())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start building a client for the given tenant API key
    pub fn builder(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key_id, api_key_secret)
    }

    /// Build a client from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let (id, secret) = config.api_key.resolve()?;
        Self::builder(id, secret)
            .base_url(config.normalized_base_url())
            .cache(config.cache.clone())
            .authentication(config.authentication.clone())
            .build()
    }

    /// API base URL, without a trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Tenant API key id
    #[must_use]
    pub fn api_key_id(&self) -> &str {
        &self.inner.api_key_id
    }

    /// Tenant API key secret, the HS256 signing key for locally issued tokens
    #[must_use]
    pub fn api_key_secret(&self) -> &str {
        &self.inner.api_key_secret
    }

    /// Time source
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// Cache regions owned by this client
    #[must_use]
    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.inner.caches
    }

    /// Authenticator defaults
    #[must_use]
    pub fn authentication(&self) -> &AuthenticationConfig {
        &self.inner.authentication
    }

    /// Absolute href for a path relative to the base URL
    #[must_use]
    pub fn href(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    /// Fetch a resource as raw JSON
    pub async fn get_value(&self, href: &str, options: &RequestOptions) -> Result<Value> {
        self.inner.data_store.get_resource(href, options).await
    }

    /// Fetch a resource and deserialize it
    pub async fn get_resource<T: DeserializeOwned>(
        &self,
        href: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        let value = self.get_value(href, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST `body` to `href` and deserialize the response
    pub async fn create_resource<T: DeserializeOwned>(
        &self,
        href: &str,
        options: &RequestOptions,
        body: Body,
    ) -> Result<T> {
        let value = self
            .inner
            .data_store
            .create_resource(href, options, body)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// DELETE `href`
    pub async fn delete_resource(&self, href: &str) -> Result<()> {
        self.inner.data_store.delete_resource(href).await
    }

    /// Fetch an application
    pub async fn get_application(&self, href: &str) -> Result<Application> {
        self.get_resource(href, &RequestOptions::new()).await
    }

    /// Fetch an account
    pub async fn get_account(&self, href: &str) -> Result<Account> {
        self.get_resource(href, &RequestOptions::new()).await
    }

    /// Fetch a directory
    pub async fn get_directory(&self, href: &str) -> Result<Directory> {
        self.get_resource(href, &RequestOptions::new()).await
    }

    /// Look up an API key of `application_href` by key id.
    ///
    /// Lookups are cached per application (`{application}/apiKeys?id={id}`),
    /// so a key found for one application is never served to another.
    /// Otherwise the application's key collection is searched by id.
    pub async fn get_api_key(&self, application_href: &str, id: &str) -> Result<ApiKey> {
        let search = format!("{}/apiKeys", application_href.trim_end_matches('/'));
        let cache_key = format!("{search}?id={id}");
        let cache = self.inner.caches.get(regions::API_KEYS);
        if let Some(ref cache) = cache {
            if let Some(value) = cache.get(&cache_key).await {
                if let Ok(key) = serde_json::from_value::<ApiKey>(value) {
                    debug!(key_id = %id, "API key served from cache");
                    return Ok(key);
                }
            }
        }

        let keys: Collection<ApiKey> = self
            .get_resource(&search, &RequestOptions::new().query("id", id))
            .await?;
        let key = keys
            .items
            .into_iter()
            .find(|k| k.id == id)
            .ok_or_else(|| Error::remote(404, 404, format!("API key {id} not found")))?;
        if let Some(cache) = cache {
            cache.put(&cache_key, serde_json::to_value(&key)?, true).await;
        }
        Ok(key)
    }

    /// Look up a tenant API key by id, regardless of application
    pub async fn get_tenant_api_key(&self, id: &str) -> Result<ApiKey> {
        self.get_resource(&self.href(&format!("apiKeys/{id}")), &RequestOptions::new())
            .await
    }
}

/// Builder for [`Client`]
#[must_use]
pub struct ClientBuilder {
    base_url: String,
    api_key_id: String,
    api_key_secret: String,
    data_store: Option<Arc<dyn DataStore>>,
    caches: Option<Arc<CacheManager>>,
    clock: Option<SharedClock>,
    cache: CacheConfig,
    authentication: AuthenticationConfig,
}

impl ClientBuilder {
    /// Builder with default base URL and cache settings
    pub fn new(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            data_store: None,
            caches: None,
            clock: None,
            cache: CacheConfig::default(),
            authentication: AuthenticationConfig::default(),
        }
    }

    /// API base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Remote data store; defaults to [`HttpDataStore`]. It is wrapped in a
    /// [`CachingDataStore`] unless caching is disabled.
    pub fn data_store(mut self, data_store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(data_store);
        self
    }

    /// Use a pre-built cache manager instead of one built from the cache config
    pub fn cache_manager(mut self, caches: Arc<CacheManager>) -> Self {
        self.caches = Some(caches);
        self
    }

    /// Time source; defaults to the system clock
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cache settings
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Authenticator defaults
    pub fn authentication(mut self, authentication: AuthenticationConfig) -> Self {
        self.authentication = authentication;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Client> {
        if self.api_key_id.is_empty() || self.api_key_secret.is_empty() {
            return Err(Error::Configuration(
                "API key id and secret are required".to_string(),
            ));
        }

        let clock = self.clock.unwrap_or_else(clock::system);
        let caches = self.caches.unwrap_or_else(|| {
            Arc::new(CacheManager::with_defaults(&self.cache, clock.clone()))
        });

        let remote: Arc<dyn DataStore> = match self.data_store {
            Some(store) => store,
            None => Arc::new(HttpDataStore::new(
                &self.base_url,
                &self.api_key_id,
                &self.api_key_secret,
            )?),
        };
        let data_store: Arc<dyn DataStore> = if self.cache.enabled {
            Arc::new(CachingDataStore::new(remote, caches.clone()))
        } else {
            remote
        };

        info!(
            base_url = %self.base_url,
            caching = self.cache.enabled,
            "Identity client ready"
        );

        Ok(Client {
            inner: Arc::new(Inner {
                base_url: self.base_url,
                api_key_id: self.api_key_id,
                api_key_secret: self.api_key_secret,
                data_store,
                caches,
                clock,
                authentication: self.authentication,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct KeyStore {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl DataStore for KeyStore {
        async fn get_resource(&self, href: &str, options: &RequestOptions) -> Result<Value> {
            *self.calls.lock() += 1;
            assert!(href.ends_with("/applications/app/apiKeys"));
            if options.query != vec![("id".to_string(), "A".to_string())] {
                return Ok(json!({"items": []}));
            }
            Ok(json!({"items": [{
                "href": "https://api.example.com/v1/apiKeys/A",
                "id": "A",
                "secret": "S",
                "status": "ENABLED",
                "account": {"href": "https://api.example.com/v1/accounts/1"}
            }]}))
        }

        async fn create_resource(&self, _: &str, _: &RequestOptions, _: Body) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn delete_resource(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn client(store: Arc<KeyStore>) -> Client {
        Client::builder("tenant", "tenant-secret")
            .base_url("https://api.example.com/v1/")
            .data_store(store)
            .clock(Arc::new(ManualClock::new(0)))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_api_key() {
        let err = Client::builder("", "").build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn href_joins_base_url() {
        let client = client(Arc::new(KeyStore::default()));
        assert_eq!(client.href("/apiKeys/A"), "https://api.example.com/v1/apiKeys/A");
    }

    #[tokio::test]
    async fn api_key_lookup_is_cached() {
        // GIVEN: a client whose store serves one key
        let store = Arc::new(KeyStore::default());
        let client = client(store.clone());
        let app = "https://api.example.com/v1/applications/app";

        // WHEN: the key is looked up twice
        let first = client.get_api_key(app, "A").await.unwrap();
        let second = client.get_api_key(app, "A").await.unwrap();

        // THEN: only the first lookup reaches the store
        assert_eq!(first, second);
        assert_eq!(*store.calls.lock(), 1);
    }

    #[tokio::test]
    async fn unknown_api_key_is_not_found() {
        let store = Arc::new(KeyStore::default());
        let client = client(store);
        let err = client
            .get_api_key("https://api.example.com/v1/applications/app", "B")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
