//! Access to remote resources.
//!
//! Authenticators only ever need three things from the API: fetch a resource
//! by href, post a body to an href, and delete an href. [`DataStore`] is that
//! seam. [`HttpDataStore`] talks to the real API over `reqwest`;
//! [`CachingDataStore`] wraps any store and serves repeated reads from the
//! client's cache regions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use tracing::{debug, instrument, trace};
use url::Url;

use crate::cache::{Cache, CacheManager};
use crate::{Error, Result};

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Comma separated list of links to expand
    pub expand: Option<String>,
    /// Skip the cache for this read
    pub nocache: bool,
}

impl RequestOptions {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Expand linked resources
    #[must_use]
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    /// Bypass the cache
    #[must_use]
    pub fn nocache(mut self) -> Self {
        self.nocache = true;
        self
    }

    fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(ref expand) = self.expand {
            pairs.push(("expand", expand.as_str()));
        }
        pairs
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `application/json`
    Json(Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
}

/// Remote resource access used by the client and authenticators
#[async_trait]
pub trait DataStore: Send + Sync + fmt::Debug {
    /// GET `href`
    async fn get_resource(&self, href: &str, options: &RequestOptions) -> Result<Value>;

    /// POST `body` to `href`
    async fn create_resource(&self, href: &str, options: &RequestOptions, body: Body)
    -> Result<Value>;

    /// DELETE `href`
    async fn delete_resource(&self, href: &str) -> Result<()>;
}

/// [`DataStore`] over HTTPS, authenticated with the tenant API key
pub struct HttpDataStore {
    http: reqwest::Client,
    base_url: String,
    api_key_id: String,
    api_key_secret: String,
}

impl fmt::Debug for HttpDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDataStore")
            .field("base_url", &self.base_url)
            .field("api_key_id", &self.api_key_id)
            .finish_non_exhaustive()
    }
}

impl HttpDataStore {
    /// Store for `base_url` using the given API key
    pub fn new(
        base_url: impl Into<String>,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, base_url, api_key_id, api_key_secret))
    }

    /// Store using an existing `reqwest` client
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
        }
    }

    /// Absolute URL for `href`; relative hrefs are resolved against the base URL
    fn url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}/{}", self.base_url, href.trim_start_matches('/'))
        }
    }

    fn request(&self, method: reqwest::Method, href: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(href))
            .basic_auth(&self.api_key_id, Some(&self.api_key_secret))
            .header(ACCEPT, "application/json")
            .header(
                USER_AGENT,
                concat!("identity-client/", env!("CARGO_PKG_VERSION")),
            )
    }

    async fn read_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return Ok(response.json::<Value>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(remote_error(status.as_u16(), &body))
    }
}

/// Map an API error document (`{status, code, message, developerMessage}`)
fn remote_error(status: u16, body: &str) -> Error {
    let doc: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = doc
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(u32::from(status));
    let message = doc
        .get("message")
        .or_else(|| doc.get("developerMessage"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("HTTP {status}"), str::to_string);
    Error::remote(status, code, message)
}

#[async_trait]
impl DataStore for HttpDataStore {
    #[instrument(skip(self, options), level = "debug")]
    async fn get_resource(&self, href: &str, options: &RequestOptions) -> Result<Value> {
        let response = self
            .request(reqwest::Method::GET, href)
            .query(&options.query_pairs())
            .send()
            .await?;
        Self::read_response(response).await
    }

    #[instrument(skip(self, options, body), level = "debug")]
    async fn create_resource(
        &self,
        href: &str,
        options: &RequestOptions,
        body: Body,
    ) -> Result<Value> {
        let builder = self
            .request(reqwest::Method::POST, href)
            .query(&options.query_pairs());
        let builder = match body {
            Body::Json(value) => builder.json(&value),
            Body::Form(fields) => builder.form(&fields),
        };
        Self::read_response(builder.send().await?).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_resource(&self, href: &str) -> Result<()> {
        let response = self.request(reqwest::Method::DELETE, href).send().await?;
        Self::read_response(response).await.map(|_| ())
    }
}

/// Region a resource href belongs to: the path segment before its id
/// (`…/apiKeys/{id}` → `apiKeys`).
#[must_use]
pub fn region_for_href(href: &str) -> Option<String> {
    let path = Url::parse(href)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| href.split('?').next().unwrap_or_default().to_string());
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let _id = segments.next()?;
    segments.next().map(str::to_string)
}

/// [`DataStore`] that serves single-resource reads from the cache.
///
/// Reads with a query string are collection searches and always go to the
/// wrapped store, but every item they return is cached under its own href.
/// Reads with `nocache` skip the lookup and refresh the entry.
#[derive(Debug)]
pub struct CachingDataStore {
    inner: Arc<dyn DataStore>,
    caches: Arc<CacheManager>,
}

impl CachingDataStore {
    /// Wrap `inner`, caching into the regions of `caches`
    pub fn new(inner: Arc<dyn DataStore>, caches: Arc<CacheManager>) -> Self {
        Self { inner, caches }
    }

    fn cache_for(&self, href: &str) -> Option<Arc<Cache>> {
        region_for_href(href).and_then(|region| self.caches.get(&region))
    }

    async fn remember(&self, resource: &Value) {
        let Some(href) = resource.get("href").and_then(Value::as_str) else {
            return;
        };
        if let Some(cache) = self.cache_for(href) {
            cache.put(href, resource.clone(), true).await;
        }
    }

    async fn remember_items(&self, collection: &Value) {
        if let Some(items) = collection.get("items").and_then(Value::as_array) {
            for item in items {
                self.remember(item).await;
            }
        }
    }
}

#[async_trait]
impl DataStore for CachingDataStore {
    async fn get_resource(&self, href: &str, options: &RequestOptions) -> Result<Value> {
        if !options.query.is_empty() {
            let collection = self.inner.get_resource(href, options).await?;
            self.remember_items(&collection).await;
            return Ok(collection);
        }

        let cache = self.cache_for(href);
        if let Some(ref cache) = cache {
            if !options.nocache && options.expand.is_none() {
                if let Some(value) = cache.get(href).await {
                    trace!(href, region = cache.region(), "Served from cache");
                    return Ok(value);
                }
            }
        }

        let value = self.inner.get_resource(href, options).await?;
        if let Some(cache) = cache {
            debug!(href, region = cache.region(), "Caching resource");
            cache.put(href, value.clone(), true).await;
        }
        Ok(value)
    }

    async fn create_resource(
        &self,
        href: &str,
        options: &RequestOptions,
        body: Body,
    ) -> Result<Value> {
        let value = self.inner.create_resource(href, options, body).await?;
        self.remember(&value).await;
        Ok(value)
    }

    async fn delete_resource(&self, href: &str) -> Result<()> {
        self.inner.delete_resource(href).await?;
        if let Some(cache) = self.cache_for(href) {
            cache.delete(href).await;
        }
        Ok(())
    }
}
