//! OAuth2 client-credentials exchange performed locally.
//!
//! A client presents its API key with HTTP Basic and receives an HS256 token
//! signed with the tenant secret. The token is later accepted by
//! [`BearerTokenAuthenticator`](super::bearer::BearerTokenAuthenticator).

use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::basic::verify_api_key;
use super::jwt::{self, Claims};
use super::request::AuthRequest;
use super::result::ClientCredentialsResult;
use super::scope::{ScopeFactory, ScopeFactoryCapable, ScopeSubject};
use crate::client::Client;
use crate::resource::TokenResponse;
use crate::{Error, Result};

/// Grant type accepted by the exchange
pub const CLIENT_CREDENTIALS: &str = "client_credentials";

/// Trades Basic API key credentials for a bearer token
#[derive(Debug, Clone)]
pub struct BasicExchangeAuthenticator {
    client: Client,
    application_href: String,
    ttl: u64,
    scope_factory: Option<ScopeFactory>,
}

impl BasicExchangeAuthenticator {
    /// Exchange for `application_href`, issuing tokens that live for the
    /// client's configured token ttl
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        let ttl = client.authentication().token_ttl;
        Self {
            client,
            application_href: application_href.into(),
            ttl,
            scope_factory: None,
        }
    }

    /// Lifetime of issued tokens in seconds
    #[must_use]
    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Lifetime of issued tokens in seconds
    #[must_use]
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Authenticate `request` and issue a token.
    ///
    /// The requested scope is read from the `scope` body field or query
    /// parameter and only granted through the scope factory.
    #[instrument(skip_all, fields(application = %self.application_href))]
    pub async fn authenticate(&self, request: &AuthRequest) -> Result<ClientCredentialsResult> {
        if let Some(method) = request.get_method() {
            if method != "POST" {
                return Err(Error::MalformedRequest(format!(
                    "token requests must use POST, got {method}"
                )));
            }
        }
        if let Some(grant_type) = request.param("grant_type") {
            if grant_type != CLIENT_CREDENTIALS {
                return Err(Error::MalformedRequest(format!(
                    "unsupported grant_type {grant_type}"
                )));
            }
        }

        let credentials = request.basic_credentials()?;
        let (api_key, account) =
            verify_api_key(&self.client, &self.application_href, &credentials).await?;

        let requested = request.param("scope");
        let scope = match self.scope_factory {
            Some(ref factory) => {
                factory.scope_for(ScopeSubject::Account(&account), requested.as_deref())?
            }
            None => None,
        };

        let now = self.client.clock().now_secs();
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        let mut claims = Claims::new();
        claims.insert("sub".to_string(), json!(api_key.id));
        claims.insert("iss".to_string(), json!(self.application_href));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now.saturating_add(ttl)));
        if let Some(ref scope) = scope {
            claims.insert("scope".to_string(), Value::String(scope.clone()));
        }

        let token = jwt::sign(&claims, self.client.api_key_secret(), None)?;
        debug!(key_id = %api_key.id, ttl = self.ttl, scope = ?scope, "Issued client credentials token");

        Ok(ClientCredentialsResult {
            api_key,
            account,
            application_href: self.application_href.clone(),
            token_response: TokenResponse::bearer(token, self.ttl, scope),
        })
    }
}

impl ScopeFactoryCapable for BasicExchangeAuthenticator {
    fn set_scope_factory(&mut self, factory: ScopeFactory) {
        self.scope_factory = Some(factory);
    }

    fn scope_factory(&self) -> Option<&ScopeFactory> {
        self.scope_factory.as_ref()
    }
}
