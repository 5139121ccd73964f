//! Authenticators
//!
//! | Credential | Authenticator |
//! |------------|---------------|
//! | `Authorization: Basic` API key | [`BasicApiKeyAuthenticator`] |
//! | Basic API key traded for a token | [`BasicExchangeAuthenticator`] |
//! | Bearer token from the exchange | [`BearerTokenAuthenticator`] |
//! | Access token JWT (local or remote check) | [`AccessTokenAuthenticator`] |
//! | Password / refresh / client credentials / social grants | [`GrantAuthenticator`] |
//!
//! Request-driven authenticators implement [`RequestAuthenticator`] so they
//! can sit behind the [`middleware`](crate::middleware).

pub mod access_token;
pub mod basic;
pub mod bearer;
pub mod exchange;
pub mod grant;
pub mod jwt;
pub mod request;
pub mod result;
pub mod scope;

use async_trait::async_trait;
use tracing::debug;

pub use access_token::{
    AccessTokenAuthenticator, AdministratorKeyResolver, KeyResolver, SecretKeyResolver,
};
pub use basic::BasicApiKeyAuthenticator;
pub use bearer::BearerTokenAuthenticator;
pub use exchange::BasicExchangeAuthenticator;
pub use grant::{
    ClientCredentialsGrantAuthenticator, ClientCredentialsGrantRequest, GrantAuthenticator,
    GrantKind, IdSiteTokenGrantAuthenticator, IdSiteTokenGrantRequest, PasswordGrantAuthenticator,
    PasswordGrantRequest, RefreshGrantAuthenticator, RefreshGrantRequest, SocialGrantAuthenticator,
    SocialGrantRequest, StormpathTokenGrantAuthenticator, StormpathTokenGrantRequest, TokenGrant,
};
pub use request::{AuthRequest, BasicCredentials};
pub use result::{
    ApiAuthenticationResult, Authenticated, AuthenticationResult, BearerAuthenticationResult,
    ClientCredentialsResult, GrantResult, JwtAuthenticationResult,
};
pub use scope::{ScopeFactory, ScopeFactoryCapable, ScopeSubject};

use crate::client::Client;
use crate::{Error, Result};

/// Authenticates an inbound request
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    /// Authenticate `request`
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult>;
}

#[async_trait]
impl RequestAuthenticator for BasicApiKeyAuthenticator {
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult> {
        self.authenticate(request).await.map(Into::into)
    }
}

#[async_trait]
impl RequestAuthenticator for BasicExchangeAuthenticator {
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult> {
        self.authenticate(request).await.map(Into::into)
    }
}

#[async_trait]
impl RequestAuthenticator for BearerTokenAuthenticator {
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult> {
        self.authenticate(request).await.map(Into::into)
    }
}

#[async_trait]
impl RequestAuthenticator for AccessTokenAuthenticator {
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult> {
        self.authenticate(request).await.map(Into::into)
    }
}

/// Picks an authenticator from the request shape.
///
/// * `Basic` with `grant_type=client_credentials` → [`BasicExchangeAuthenticator`]
/// * other `Basic` → [`BasicApiKeyAuthenticator`]
/// * anything carrying a bearer token → [`AccessTokenAuthenticator`]
#[derive(Debug, Clone)]
pub struct ApiRequestAuthenticator {
    basic: BasicApiKeyAuthenticator,
    exchange: BasicExchangeAuthenticator,
    access_token: AccessTokenAuthenticator,
}

impl ApiRequestAuthenticator {
    /// Dispatcher for requests against `application_href`
    pub fn new(client: &Client, application_href: &str) -> Self {
        Self {
            basic: BasicApiKeyAuthenticator::new(client.clone(), application_href),
            exchange: BasicExchangeAuthenticator::new(client.clone(), application_href),
            access_token: AccessTokenAuthenticator::for_application(client.clone(), application_href),
        }
    }

    /// Replace the exchange authenticator (e.g. to add a scope factory)
    #[must_use]
    pub fn with_exchange(mut self, exchange: BasicExchangeAuthenticator) -> Self {
        self.exchange = exchange;
        self
    }

    /// Replace the access token authenticator
    #[must_use]
    pub fn with_access_token(mut self, access_token: AccessTokenAuthenticator) -> Self {
        self.access_token = access_token;
        self
    }
}

#[async_trait]
impl RequestAuthenticator for ApiRequestAuthenticator {
    async fn authenticate_request(&self, request: &AuthRequest) -> Result<AuthenticationResult> {
        if request.has_scheme("basic") {
            if request.param("grant_type").as_deref() == Some(exchange::CLIENT_CREDENTIALS) {
                debug!("Dispatching to Basic exchange");
                return self.exchange.authenticate_request(request).await;
            }
            debug!("Dispatching to Basic API key authentication");
            return self.basic.authenticate_request(request).await;
        }
        if request.bearer_token().is_some() {
            debug!("Dispatching to access token authentication");
            return self.access_token.authenticate_request(request).await;
        }
        Err(Error::Unauthenticated(
            "request carries no Basic or Bearer credentials".to_string(),
        ))
    }
}
