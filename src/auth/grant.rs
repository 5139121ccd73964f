//! OAuth2 grants exchanged at the application's token endpoint.
//!
//! Each grant request checks its own fields before any I/O, then the form
//! is posted to `{application}/oauth/token` and the JSON answer wrapped in a
//! [`GrantResult`].

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::jwt;
use super::result::GrantResult;
use super::scope::{ScopeFactory, ScopeFactoryCapable};
use crate::client::Client;
use crate::datastore::{Body, RequestOptions};
use crate::resource::TokenResponse;
use crate::{Error, Result};

/// Grant types understood by the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Username and password
    Password,
    /// Refresh token
    RefreshToken,
    /// API key id and secret
    ClientCredentials,
    /// Token issued by the API (e.g. after ID Site)
    StormpathToken,
    /// Social provider code or access token
    StormpathSocial,
    /// ID Site callback token
    IdSiteToken,
}

impl GrantKind {
    /// `grant_type` form value
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::StormpathToken => "stormpath_token",
            Self::StormpathSocial => "stormpath_social",
            Self::IdSiteToken => "id_site_token",
        }
    }
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grant request body
pub trait TokenGrant: Send + Sync {
    /// Grant type
    const KIND: GrantKind;

    /// Reject missing or empty fields
    fn validate(&self) -> Result<()>;

    /// Form fields, without `grant_type`
    fn fields(&self) -> Vec<(String, String)>;

    /// Scope asked for by the caller
    fn requested_scope(&self) -> Option<&str> {
        None
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MalformedRequest(format!("{name} is required")));
    }
    Ok(())
}

fn push_opt(fields: &mut Vec<(String, String)>, name: &str, value: Option<&String>) {
    if let Some(value) = value {
        fields.push((name.to_string(), value.clone()));
    }
}

/// `grant_type=password`
#[derive(Clone, Default)]
pub struct PasswordGrantRequest {
    /// Username or email
    pub username: String,
    /// Password
    pub password: String,
    /// Directory or group href to authenticate against
    pub account_store: Option<String>,
    /// Organization name key
    pub organization_name_key: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
}

impl fmt::Debug for PasswordGrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordGrantRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("account_store", &self.account_store)
            .finish_non_exhaustive()
    }
}

impl PasswordGrantRequest {
    /// Request for `username` / `password`
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

impl TokenGrant for PasswordGrantRequest {
    const KIND: GrantKind = GrantKind::Password;

    fn validate(&self) -> Result<()> {
        require("username", &self.username)?;
        require("password", &self.password)
    }

    fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("username".to_string(), self.username.clone()),
            ("password".to_string(), self.password.clone()),
        ];
        push_opt(&mut fields, "accountStore", self.account_store.as_ref());
        push_opt(
            &mut fields,
            "organizationNameKey",
            self.organization_name_key.as_ref(),
        );
        push_opt(&mut fields, "scope", self.scope.as_ref());
        fields
    }

    fn requested_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// `grant_type=refresh_token`
#[derive(Debug, Clone, Default)]
pub struct RefreshGrantRequest {
    /// Refresh token
    pub refresh_token: String,
}

impl RefreshGrantRequest {
    /// Request for `refresh_token`
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
        }
    }
}

impl TokenGrant for RefreshGrantRequest {
    const KIND: GrantKind = GrantKind::RefreshToken;

    fn validate(&self) -> Result<()> {
        require("refresh_token", &self.refresh_token)
    }

    fn fields(&self) -> Vec<(String, String)> {
        vec![("refresh_token".to_string(), self.refresh_token.clone())]
    }
}

/// `grant_type=client_credentials`
#[derive(Clone, Default)]
pub struct ClientCredentialsGrantRequest {
    /// API key id
    pub api_key_id: String,
    /// API key secret
    pub api_key_secret: String,
    /// Requested scope
    pub scope: Option<String>,
}

impl fmt::Debug for ClientCredentialsGrantRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsGrantRequest")
            .field("api_key_id", &self.api_key_id)
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsGrantRequest {
    /// Request for an API key
    pub fn new(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            scope: None,
        }
    }
}

impl TokenGrant for ClientCredentialsGrantRequest {
    const KIND: GrantKind = GrantKind::ClientCredentials;

    fn validate(&self) -> Result<()> {
        require("apiKey.id", &self.api_key_id)?;
        require("apiKey.secret", &self.api_key_secret)
    }

    fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("apiKeyId".to_string(), self.api_key_id.clone()),
            ("apiKeySecret".to_string(), self.api_key_secret.clone()),
        ];
        push_opt(&mut fields, "scope", self.scope.as_ref());
        fields
    }

    fn requested_scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// `grant_type=stormpath_token`
#[derive(Debug, Clone, Default)]
pub struct StormpathTokenGrantRequest {
    /// Token issued by the API
    pub token: String,
}

impl StormpathTokenGrantRequest {
    /// Request for `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenGrant for StormpathTokenGrantRequest {
    const KIND: GrantKind = GrantKind::StormpathToken;

    fn validate(&self) -> Result<()> {
        require("token", &self.token)
    }

    fn fields(&self) -> Vec<(String, String)> {
        vec![("token".to_string(), self.token.clone())]
    }
}

/// `grant_type=id_site_token`
#[derive(Debug, Clone, Default)]
pub struct IdSiteTokenGrantRequest {
    /// `jwtResponse` received on the ID Site callback
    pub token: String,
}

impl IdSiteTokenGrantRequest {
    /// Request for `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenGrant for IdSiteTokenGrantRequest {
    const KIND: GrantKind = GrantKind::IdSiteToken;

    fn validate(&self) -> Result<()> {
        require("token", &self.token)
    }

    fn fields(&self) -> Vec<(String, String)> {
        vec![("token".to_string(), self.token.clone())]
    }
}

/// `grant_type=stormpath_social`; needs either a code or an access token
#[derive(Debug, Clone, Default)]
pub struct SocialGrantRequest {
    /// Provider id (`google`, `github`, ...)
    pub provider_id: String,
    /// Authorization code
    pub code: Option<String>,
    /// Provider access token
    pub access_token: Option<String>,
}

impl TokenGrant for SocialGrantRequest {
    const KIND: GrantKind = GrantKind::StormpathSocial;

    fn validate(&self) -> Result<()> {
        require("providerId", &self.provider_id)?;
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !has(&self.code) && !has(&self.access_token) {
            return Err(Error::MalformedRequest(
                "code or accessToken is required".to_string(),
            ));
        }
        Ok(())
    }

    fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![("providerId".to_string(), self.provider_id.clone())];
        push_opt(&mut fields, "code", self.code.as_ref());
        push_opt(&mut fields, "accessToken", self.access_token.as_ref());
        fields
    }
}

/// Exchanges one kind of grant at the token endpoint
pub struct GrantAuthenticator<G> {
    client: Client,
    application_href: String,
    scope_factory: Option<ScopeFactory>,
    _grant: PhantomData<fn(&G)>,
}

impl<G> fmt::Debug for GrantAuthenticator<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantAuthenticator")
            .field("application_href", &self.application_href)
            .field("scope_factory", &self.scope_factory.is_some())
            .finish_non_exhaustive()
    }
}

impl<G> Clone for GrantAuthenticator<G> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            application_href: self.application_href.clone(),
            scope_factory: self.scope_factory.clone(),
            _grant: PhantomData,
        }
    }
}

/// Password grant
pub type PasswordGrantAuthenticator = GrantAuthenticator<PasswordGrantRequest>;
/// Refresh token grant
pub type RefreshGrantAuthenticator = GrantAuthenticator<RefreshGrantRequest>;
/// Client credentials grant
pub type ClientCredentialsGrantAuthenticator = GrantAuthenticator<ClientCredentialsGrantRequest>;
/// API token grant
pub type StormpathTokenGrantAuthenticator = GrantAuthenticator<StormpathTokenGrantRequest>;
/// Social grant
pub type SocialGrantAuthenticator = GrantAuthenticator<SocialGrantRequest>;
/// ID Site token grant
pub type IdSiteTokenGrantAuthenticator = GrantAuthenticator<IdSiteTokenGrantRequest>;

impl<G: TokenGrant> GrantAuthenticator<G> {
    /// Authenticator posting to `{application_href}/oauth/token`
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        Self {
            client,
            application_href: application_href.into(),
            scope_factory: None,
            _grant: PhantomData,
        }
    }

    /// Token endpoint
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.application_href.trim_end_matches('/'))
    }

    /// Exchange `request` for a token
    #[instrument(skip_all, fields(grant = %G::KIND, application = %self.application_href))]
    pub async fn authenticate(&self, request: &G) -> Result<GrantResult> {
        request.validate()?;

        let mut form = vec![("grant_type".to_string(), G::KIND.as_str().to_string())];
        form.extend(request.fields());

        let mut response: TokenResponse = self
            .client
            .create_resource(&self.token_endpoint(), &RequestOptions::new(), Body::Form(form))
            .await?;

        if let Some(ref factory) = self.scope_factory {
            if let Some((token, scope)) =
                factory.rescope(&response.access_token, request.requested_scope())?
            {
                response.access_token = token;
                response.scope = Some(scope);
            }
        }

        let account_href = jwt::decode_unverified(&response.access_token)
            .ok()
            .and_then(|claims| jwt::claim_str(&claims, "sub").map(str::to_string));
        debug!(account = ?account_href, "Grant exchanged");

        Ok(GrantResult {
            kind: G::KIND,
            application_href: self.application_href.clone(),
            token_response: response,
            account_href,
        })
    }
}

impl<G> ScopeFactoryCapable for GrantAuthenticator<G> {
    fn set_scope_factory(&mut self, factory: ScopeFactory) {
        self.scope_factory = Some(factory);
    }

    fn scope_factory(&self) -> Option<&ScopeFactory> {
        self.scope_factory.as_ref()
    }
}
