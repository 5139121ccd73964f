//! Typed views over the JSON resources touched by authentication.
//!
//! Only the fields the authenticators read are modelled; unknown fields are
//! ignored on deserialization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::Client;
use crate::Result;

/// Lifecycle status shared by keys, accounts, applications and directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Usable
    #[default]
    Enabled,
    /// Administratively disabled
    Disabled,
    /// Account awaiting email verification
    Unverified,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl Status {
    /// `true` only for [`Status::Enabled`]
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

/// Reference to another resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Absolute href of the referenced resource
    pub href: String,
}

impl Link {
    /// Link to `href`
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// API key belonging to an account
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Resource href
    pub href: String,
    /// Key id (the Basic username / JWT `kid`)
    pub id: String,
    /// Key secret
    pub secret: String,
    /// Key status
    #[serde(default)]
    pub status: Status,
    /// Owning account
    pub account: Link,
    /// Owning tenant
    #[serde(default)]
    pub tenant: Option<Link>,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("href", &self.href)
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("status", &self.status)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Resource href
    pub href: String,
    /// Login name
    #[serde(default)]
    pub username: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// First name
    #[serde(default)]
    pub given_name: Option<String>,
    /// Last name
    #[serde(default)]
    pub surname: Option<String>,
    /// Account status
    #[serde(default)]
    pub status: Status,
    /// Directory the account lives in
    #[serde(default)]
    pub directory: Option<Link>,
}

/// Application registered with the tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Resource href
    pub href: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Application status
    #[serde(default)]
    pub status: Status,
    /// SAML policy, when SAML is configured
    #[serde(default)]
    pub saml_policy: Option<Link>,
}

impl Application {
    /// Application known only by href
    pub fn from_href(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            name: None,
            status: Status::Enabled,
            saml_policy: None,
        }
    }
}

/// Directory of accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    /// Resource href
    pub href: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Directory status
    #[serde(default)]
    pub status: Status,
}

/// Paged collection wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    /// Items on this page
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Decoded form of a JWT as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedJwt {
    /// JOSE header
    #[serde(default)]
    pub header: Map<String, Value>,
    /// Claims
    #[serde(default)]
    pub claims: Map<String, Value>,
    /// Signature segment
    #[serde(default)]
    pub signature: String,
}

/// Server-side record of an issued access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResource {
    /// Resource href
    pub href: String,
    /// Compact token
    pub jwt: String,
    /// Decoded token
    #[serde(default)]
    pub expanded_jwt: ExpandedJwt,
    /// Account the token was issued to
    pub account: Link,
    /// Application that issued the token
    pub application: Link,
}

/// OAuth2 token endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Always `bearer` for this API
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: u64,
    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Href of the access token resource, when the server issued the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stormpath_access_token_href: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    /// Bearer response for a locally issued token
    pub fn bearer(access_token: impl Into<String>, expires_in: u64, scope: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_in,
            scope,
            stormpath_access_token_href: None,
        }
    }
}

/// Resources that can be removed remotely
#[async_trait]
pub trait Deletable {
    /// Delete the resource (revoke, for tokens)
    async fn delete(&self, client: &Client) -> Result<()>;
}

#[async_trait]
impl Deletable for AccessTokenResource {
    async fn delete(&self, client: &Client) -> Result<()> {
        client.delete_resource(&self.href).await
    }
}

#[async_trait]
impl Deletable for TokenResponse {
    async fn delete(&self, client: &Client) -> Result<()> {
        match self.stormpath_access_token_href {
            Some(ref href) => client.delete_resource(href).await,
            None => Err(crate::Error::MalformedRequest(
                "token was not issued by the API and cannot be revoked".to_string(),
            )),
        }
    }
}
