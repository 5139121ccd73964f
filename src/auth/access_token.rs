//! Access token authentication with optional remote revocation checks.
//!
//! In remote mode a token without a `kid` was issued by the Basic exchange
//! and goes straight to [`BearerTokenAuthenticator`], whatever the resolver.
//! Every other call runs once through: verify the signature with a key from a
//! [`KeyResolver`]; then either trust the token (local validation) or look
//! the token up remotely so revoked tokens are rejected; then copy the
//! inbound scope onto the result and check the application binding.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::Header;
use tracing::{debug, instrument, warn};

use super::bearer::BearerTokenAuthenticator;
use super::jwt::{self, Claims};
use super::request::AuthRequest;
use super::result::JwtAuthenticationResult;
use crate::client::Client;
use crate::datastore::RequestOptions;
use crate::resource::AccessTokenResource;
use crate::{Error, Result};

fn unauthenticated(reason: impl Into<String>) -> Error {
    Error::Unauthenticated(reason.into())
}

/// Supplies the secret a token must be signed with
#[async_trait]
pub trait KeyResolver: Send + Sync + fmt::Debug {
    /// Secret for a token with this header and (unverified) claims
    async fn resolve(&self, header: &Header, claims: &Claims) -> Result<String>;
}

/// Every token is signed with one known secret
#[derive(Clone)]
pub struct SecretKeyResolver {
    secret: String,
}

impl SecretKeyResolver {
    /// Resolver for `secret`
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for SecretKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyResolver for SecretKeyResolver {
    async fn resolve(&self, _header: &Header, _claims: &Claims) -> Result<String> {
        Ok(self.secret.clone())
    }
}

/// Resolves `kid` to the secret of an API key owned by an account in the
/// administrators directory. Keys of any other account are rejected.
#[derive(Debug, Clone)]
pub struct AdministratorKeyResolver {
    client: Client,
    directory_href: String,
}

impl AdministratorKeyResolver {
    /// Resolver accepting keys of accounts in `directory_href`
    pub fn new(client: Client, directory_href: impl Into<String>) -> Self {
        Self {
            client,
            directory_href: directory_href.into(),
        }
    }
}

#[async_trait]
impl KeyResolver for AdministratorKeyResolver {
    async fn resolve(&self, header: &Header, _claims: &Claims) -> Result<String> {
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| unauthenticated("token has no kid"))?;

        let key = self.client.get_tenant_api_key(kid).await.map_err(|e| {
            debug!(kid, error = %e, "Signing key lookup failed");
            unauthenticated("unknown signing key")
        })?;
        if !key.status.is_enabled() {
            return Err(unauthenticated("signing key is not enabled"));
        }

        let account = self
            .client
            .get_account(&key.account.href)
            .await
            .map_err(|_| unauthenticated("unknown signing key"))?;
        let is_admin = account
            .directory
            .as_ref()
            .is_some_and(|d| d.href == self.directory_href);
        if !is_admin || !account.status.is_enabled() {
            warn!(kid, account = %account.href, "Token signed by a non-administrator key");
            return Err(unauthenticated("signing key does not belong to an administrator"));
        }

        Ok(key.secret)
    }
}

/// Where a remotely validated token is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    /// `{application}/authTokens/{token}`
    Application(String),
    /// `{base}/accessTokens/{jti}`
    Tenant,
}

/// Verifies access token JWTs
#[derive(Debug, Clone)]
pub struct AccessTokenAuthenticator {
    client: Client,
    lookup: Lookup,
    resolver: Arc<dyn KeyResolver>,
    local_validation: bool,
    pinned_application: Option<String>,
}

impl AccessTokenAuthenticator {
    /// Authenticator for tokens of one application, signed with the tenant secret
    pub fn for_application(client: Client, application_href: impl Into<String>) -> Self {
        let resolver = Arc::new(SecretKeyResolver::new(client.api_key_secret()));
        let local_validation = client.authentication().local_validation;
        Self {
            client,
            lookup: Lookup::Application(application_href.into()),
            resolver,
            local_validation,
            pinned_application: None,
        }
    }

    /// Tenant-wide authenticator. When an administrators directory is
    /// configured, tokens must be signed by one of its accounts' keys.
    pub fn for_tenant(client: Client) -> Self {
        let resolver: Arc<dyn KeyResolver> =
            match client.authentication().administrators_directory.clone() {
                Some(directory) => Arc::new(AdministratorKeyResolver::new(client.clone(), directory)),
                None => Arc::new(SecretKeyResolver::new(client.api_key_secret())),
            };
        let local_validation = client.authentication().local_validation;
        Self {
            client,
            lookup: Lookup::Tenant,
            resolver,
            local_validation,
            pinned_application: None,
        }
    }

    /// Replace the key resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Trust signature and expiry without a remote lookup
    #[must_use]
    pub fn with_local_validation(mut self, local_validation: bool) -> Self {
        self.local_validation = local_validation;
        self
    }

    /// Only accept tokens issued by `application_href`
    #[must_use]
    pub fn bound_to(mut self, application_href: impl Into<String>) -> Self {
        self.pinned_application = Some(application_href.into());
        self
    }

    /// Authenticate the bearer token carried by `request`
    pub async fn authenticate(&self, request: &AuthRequest) -> Result<JwtAuthenticationResult> {
        let token = request
            .bearer_token()
            .ok_or_else(|| unauthenticated("missing bearer token"))?;
        self.authenticate_token(&token).await
    }

    /// Authenticate a raw token
    #[instrument(skip_all, fields(token = %jwt::fingerprint(token), local = self.local_validation))]
    pub async fn authenticate_token(&self, token: &str) -> Result<JwtAuthenticationResult> {
        let header = jwt::decode_header(token).map_err(|_| unauthenticated("malformed token"))?;
        let unverified =
            jwt::decode_unverified(token).map_err(|_| unauthenticated("malformed token"))?;
        if !self.local_validation && header.kid.is_none() {
            let result = self.delegate_to_bearer(token, &unverified).await?;
            self.check_binding(&result)?;
            debug!(account = %result.account_href, "Exchange token authenticated");
            return Ok(result);
        }

        let secret = self.resolver.resolve(&header, &unverified).await?;
        let verified = jwt::verify(token, &secret).map_err(|e| {
            debug!(error = %e, "Access token failed verification");
            unauthenticated("token signature is invalid")
        })?;

        if jwt::is_expired(&verified.claims, self.client.clock().now_secs()) {
            return Err(unauthenticated("token has expired"));
        }

        let result = if self.local_validation {
            Self::local_result(token, verified.claims)?
        } else {
            self.remote_result(token, verified.claims).await?
        };

        self.check_binding(&result)?;
        debug!(account = %result.account_href, "Access token authenticated");
        Ok(result)
    }

    fn local_result(token: &str, claims: Claims) -> Result<JwtAuthenticationResult> {
        let account_href = jwt::claim_str(&claims, "sub")
            .ok_or_else(|| unauthenticated("token has no subject"))?
            .to_string();
        let application_href = jwt::claim_str(&claims, "iss").map(str::to_string);
        Ok(JwtAuthenticationResult {
            jwt: token.to_string(),
            claims,
            account_href,
            application_href,
            local_validation: true,
            access_token: None,
        })
    }

    /// Tokens without a `kid` were issued by the local Basic exchange
    async fn delegate_to_bearer(
        &self,
        token: &str,
        claims: &Claims,
    ) -> Result<JwtAuthenticationResult> {
        let application_href = match self.lookup {
            Lookup::Application(ref href) => href.clone(),
            Lookup::Tenant => jwt::claim_str(claims, "iss")
                .ok_or_else(|| unauthenticated("token has no issuer"))?
                .to_string(),
        };
        let bearer = BearerTokenAuthenticator::new(self.client.clone(), application_href.clone())
            .authenticate_token(token)
            .await
            .map_err(|e| match e {
                Error::InvalidRequest(reason) => Error::Unauthenticated(reason),
                Error::Expired => unauthenticated("token has expired"),
                other => other,
            })?;

        Ok(JwtAuthenticationResult {
            jwt: token.to_string(),
            claims: bearer.claims,
            account_href: bearer.api_key.account.href,
            application_href: Some(application_href),
            local_validation: false,
            access_token: None,
        })
    }

    async fn remote_result(&self, token: &str, claims: Claims) -> Result<JwtAuthenticationResult> {
        let href = match self.lookup {
            Lookup::Application(ref application) => {
                format!("{}/authTokens/{token}", application.trim_end_matches('/'))
            }
            Lookup::Tenant => {
                let jti = jwt::claim_str(&claims, "jti")
                    .ok_or_else(|| unauthenticated("token has no jti"))?;
                self.client.href(&format!("accessTokens/{jti}"))
            }
        };

        let mut resource: AccessTokenResource = self
            .client
            .get_resource(&href, &RequestOptions::new().nocache())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    debug!("Access token not found remotely, treating as revoked");
                    unauthenticated("token has been revoked")
                } else {
                    e
                }
            })?;

        if let Some(scope) = claims.get("scope") {
            resource
                .expanded_jwt
                .claims
                .insert("scope".to_string(), scope.clone());
        }

        let mut merged = resource.expanded_jwt.claims.clone();
        for (name, value) in claims {
            merged.entry(name).or_insert(value);
        }

        Ok(JwtAuthenticationResult {
            jwt: token.to_string(),
            claims: merged,
            account_href: resource.account.href.clone(),
            application_href: Some(resource.application.href.clone()),
            local_validation: false,
            access_token: Some(resource),
        })
    }

    fn check_binding(&self, result: &JwtAuthenticationResult) -> Result<()> {
        let Some(ref expected) = self.pinned_application else {
            return Ok(());
        };
        let actual = result
            .application_href
            .clone()
            .or_else(|| jwt::claim_str(&result.claims, "aud").map(str::to_string))
            .unwrap_or_default();
        if &actual != expected {
            warn!(expected = %expected, actual = %actual, "Token issued for another application");
            return Err(Error::ApplicationMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }
}
