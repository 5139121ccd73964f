//! Shared fixtures: an in-memory identity API and a client wired to it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use parking_lot::Mutex;
use serde_json::{Value, json};

use identity_client::Client;
use identity_client::Error;
use identity_client::Result;
use identity_client::clock::ManualClock;
use identity_client::config::AuthenticationConfig;
use identity_client::datastore::{Body, DataStore, RequestOptions};

pub const BASE: &str = "https://api.example.com/v1";
pub const APP: &str = "https://api.example.com/v1/applications/app1";
pub const OTHER_APP: &str = "https://api.example.com/v1/applications/app2";
pub const TENANT_KEY_ID: &str = "TENANT";
pub const TENANT_SECRET: &str = "tenant-secret-value-0123456789abcdef";

/// 2024-01-01T00:00:00Z
pub const START_MILLIS: i64 = 1_704_067_200_000;

/// Remote API kept in memory.
///
/// Resources are keyed by href. Searches on `{app}/apiKeys?id=` return the
/// matching key unless it was restricted to other applications, and posts to `…/oauth/token` answer with the queued token
/// response.
#[derive(Debug, Default)]
pub struct MockApi {
    resources: Mutex<HashMap<String, Value>>,
    reads: Mutex<Vec<String>>,
    posts: Mutex<Vec<(String, Body)>>,
    token_response: Mutex<Option<Value>>,
    key_owners: Mutex<HashMap<String, Vec<String>>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, resource: Value) {
        let href = resource["href"].as_str().unwrap().to_string();
        self.resources.lock().insert(href, resource);
    }

    pub fn remove(&self, href: &str) {
        self.resources.lock().remove(href);
    }

    /// Add an account and an API key for it
    pub fn add_api_key(&self, id: &str, secret: &str, key_status: &str, account_status: &str) {
        let account = format!("{BASE}/accounts/{id}-owner");
        self.insert(json!({
            "href": account,
            "username": format!("{id}-owner"),
            "email": format!("{id}@example.com"),
            "status": account_status,
            "directory": {"href": format!("{BASE}/directories/customers")}
        }));
        self.insert(json!({
            "href": format!("{BASE}/apiKeys/{id}"),
            "id": id,
            "secret": secret,
            "status": key_status,
            "account": {"href": account}
        }));
    }

    /// Make key `id` visible only in the key collection of `application`
    pub fn restrict_api_key(&self, id: &str, application: &str) {
        self.key_owners
            .lock()
            .entry(id.to_string())
            .or_default()
            .push(application.to_string());
    }

    fn key_visible_in(&self, id: &str, collection: &str) -> bool {
        self.key_owners.lock().get(id).is_none_or(|owners| {
            owners
                .iter()
                .any(|app| format!("{app}/apiKeys") == collection)
        })
    }

    pub fn respond_to_token_requests(&self, response: Value) {
        *self.token_response.lock() = Some(response);
    }

    /// Number of remote reads of `href`
    pub fn reads_of(&self, href: &str) -> usize {
        self.reads.lock().iter().filter(|h| *h == href).count()
    }

    pub fn total_reads(&self) -> usize {
        self.reads.lock().len()
    }

    pub fn posts(&self) -> Vec<(String, Body)> {
        self.posts.lock().clone()
    }
}

fn not_found(href: &str) -> Error {
    Error::remote(404, 404, format!("The requested resource does not exist: {href}"))
}

#[async_trait]
impl DataStore for MockApi {
    async fn get_resource(&self, href: &str, options: &RequestOptions) -> Result<Value> {
        self.reads.lock().push(href.to_string());

        if href.ends_with("/apiKeys") {
            let id = options
                .query
                .iter()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            let items: Vec<Value> = if self.key_visible_in(&id, href) {
                self.resources
                    .lock()
                    .get(&format!("{BASE}/apiKeys/{id}"))
                    .cloned()
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            };
            return Ok(json!({ "href": href, "items": items }));
        }

        self.resources
            .lock()
            .get(href)
            .cloned()
            .ok_or_else(|| not_found(href))
    }

    async fn create_resource(
        &self,
        href: &str,
        _options: &RequestOptions,
        body: Body,
    ) -> Result<Value> {
        self.posts.lock().push((href.to_string(), body));
        if href.ends_with("/oauth/token") {
            return self
                .token_response
                .lock()
                .clone()
                .ok_or_else(|| Error::remote(400, 400, "invalid_grant"));
        }
        Err(not_found(href))
    }

    async fn delete_resource(&self, href: &str) -> Result<()> {
        self.resources
            .lock()
            .remove(href)
            .map(|_| ())
            .ok_or_else(|| not_found(href))
    }
}

/// Client for the tenant key, backed by `api` and a manual clock
pub fn client(api: &Arc<MockApi>) -> (Client, Arc<ManualClock>) {
    client_with(api, AuthenticationConfig::default())
}

pub fn client_with(
    api: &Arc<MockApi>,
    authentication: AuthenticationConfig,
) -> (Client, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let client = Client::builder(TENANT_KEY_ID, TENANT_SECRET)
        .base_url(BASE)
        .data_store(api.clone())
        .clock(clock.clone())
        .authentication(authentication)
        .build()
        .unwrap();
    (client, clock)
}

pub fn basic(id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

pub fn advance(clock: &ManualClock, secs: u64) {
    clock.advance(Duration::from_secs(secs));
}

pub fn now_secs() -> i64 {
    START_MILLIS / 1000
}
