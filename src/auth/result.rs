//! Authentication results.
//!
//! Each authenticator produces its own result type; [`AuthenticationResult`]
//! is the closed set of them and what the middleware stores in request
//! extensions. All of them expose the authenticated account through
//! [`Authenticated`].

use async_trait::async_trait;

use super::grant::GrantKind;
use super::jwt::{self, Claims};
use crate::client::Client;
use crate::datastore::RequestOptions;
use crate::resource::{AccessTokenResource, Account, ApiKey, TokenResponse};
use crate::{Error, Result};

/// Common view over every result kind
#[async_trait]
pub trait Authenticated: Send + Sync {
    /// Href of the authenticated account
    fn account_href(&self) -> Option<&str>;

    /// Href of the application the credential was issued by
    fn application_href(&self) -> Option<&str>;

    /// Compact access token, when the result carries one
    fn access_token(&self) -> Option<&str> {
        None
    }

    /// Token response, for results that issued a token
    fn token_response(&self) -> Option<&TokenResponse> {
        None
    }

    /// Granted scopes
    fn scopes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fetch the authenticated account
    async fn account(&self, client: &Client) -> Result<Account> {
        let href = self
            .account_href()
            .ok_or_else(|| Error::Unauthenticated("result carries no account".to_string()))?;
        client.get_account(href).await
    }
}

fn split_scope(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// HTTP Basic API key authentication
#[derive(Debug, Clone)]
pub struct ApiAuthenticationResult {
    /// Key that authenticated
    pub api_key: ApiKey,
    /// Owning account
    pub account: Account,
    /// Application the key was looked up through
    pub application_href: String,
}

#[async_trait]
impl Authenticated for ApiAuthenticationResult {
    fn account_href(&self) -> Option<&str> {
        Some(&self.account.href)
    }

    fn application_href(&self) -> Option<&str> {
        Some(&self.application_href)
    }

    async fn account(&self, _client: &Client) -> Result<Account> {
        Ok(self.account.clone())
    }
}

/// Basic exchange: API key credentials traded for a locally signed token
#[derive(Debug, Clone)]
pub struct ClientCredentialsResult {
    /// Key that authenticated
    pub api_key: ApiKey,
    /// Owning account
    pub account: Account,
    /// Issuing application
    pub application_href: String,
    /// Issued token
    pub token_response: TokenResponse,
}

#[async_trait]
impl Authenticated for ClientCredentialsResult {
    fn account_href(&self) -> Option<&str> {
        Some(&self.account.href)
    }

    fn application_href(&self) -> Option<&str> {
        Some(&self.application_href)
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.token_response.access_token)
    }

    fn token_response(&self) -> Option<&TokenResponse> {
        Some(&self.token_response)
    }

    fn scopes(&self) -> Vec<String> {
        split_scope(self.token_response.scope.as_deref())
    }

    async fn account(&self, _client: &Client) -> Result<Account> {
        Ok(self.account.clone())
    }
}

/// Bearer token issued by a Basic exchange, verified locally
#[derive(Debug, Clone)]
pub struct BearerAuthenticationResult {
    /// Key named by the token's `client_id`
    pub api_key: ApiKey,
    /// Application the key was looked up through
    pub application_href: String,
    /// Raw token
    pub token: String,
    /// Normalized claims (`client_id`, `timestamp`, `expires_in`, `scope?`)
    pub claims: Claims,
    /// Space separated `scope` claim, split
    pub granted_scopes: Vec<String>,
}

#[async_trait]
impl Authenticated for BearerAuthenticationResult {
    fn account_href(&self) -> Option<&str> {
        Some(&self.api_key.account.href)
    }

    fn application_href(&self) -> Option<&str> {
        Some(&self.application_href)
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.token)
    }

    fn scopes(&self) -> Vec<String> {
        self.granted_scopes.clone()
    }
}

/// Access token verified by signature, and remotely unless validated locally
#[derive(Debug, Clone)]
pub struct JwtAuthenticationResult {
    /// Raw token
    pub jwt: String,
    /// Token claims (with the inbound `scope` copied in)
    pub claims: Claims,
    /// Account the token was issued to
    pub account_href: String,
    /// Application that issued the token
    pub application_href: Option<String>,
    /// `true` when only signature and expiry were checked
    pub local_validation: bool,
    /// Server-side token record, for remotely validated tokens
    pub access_token: Option<AccessTokenResource>,
}

impl JwtAuthenticationResult {
    /// Fetch the access token resource (remote mode already has it)
    pub async fn access_token_resource(&self, client: &Client) -> Result<AccessTokenResource> {
        if let Some(ref resource) = self.access_token {
            return Ok(resource.clone());
        }
        let jti = jwt::claim_str(&self.claims, "jti")
            .ok_or_else(|| Error::Unauthenticated("token has no jti".to_string()))?;
        client
            .get_resource(&client.href(&format!("accessTokens/{jti}")), &RequestOptions::new())
            .await
    }
}

#[async_trait]
impl Authenticated for JwtAuthenticationResult {
    fn account_href(&self) -> Option<&str> {
        Some(&self.account_href)
    }

    fn application_href(&self) -> Option<&str> {
        self.application_href.as_deref()
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.jwt)
    }

    fn scopes(&self) -> Vec<String> {
        split_scope(jwt::claim_str(&self.claims, "scope"))
    }
}

/// Token obtained from the application's `/oauth/token` endpoint
#[derive(Debug, Clone)]
pub struct GrantResult {
    /// Grant that produced the token
    pub kind: GrantKind,
    /// Issuing application
    pub application_href: String,
    /// Token endpoint response (possibly re-scoped)
    pub token_response: TokenResponse,
    /// `sub` of the access token
    pub account_href: Option<String>,
}

impl GrantResult {
    /// Fetch the server-side record of the issued access token
    pub async fn access_token_resource(&self, client: &Client) -> Result<AccessTokenResource> {
        let href = self
            .token_response
            .stormpath_access_token_href
            .as_deref()
            .ok_or_else(|| Error::Unauthenticated("token response has no token href".to_string()))?;
        client.get_resource(href, &RequestOptions::new()).await
    }
}

#[async_trait]
impl Authenticated for GrantResult {
    fn account_href(&self) -> Option<&str> {
        self.account_href.as_deref()
    }

    fn application_href(&self) -> Option<&str> {
        Some(&self.application_href)
    }

    fn access_token(&self) -> Option<&str> {
        Some(&self.token_response.access_token)
    }

    fn token_response(&self) -> Option<&TokenResponse> {
        Some(&self.token_response)
    }

    fn scopes(&self) -> Vec<String> {
        split_scope(self.token_response.scope.as_deref())
    }
}

/// Any authentication outcome
#[derive(Debug, Clone)]
pub enum AuthenticationResult {
    /// HTTP Basic API key
    ApiKey(ApiAuthenticationResult),
    /// Basic exchange for a signed token
    ClientCredentials(ClientCredentialsResult),
    /// Locally verified bearer token
    Bearer(BearerAuthenticationResult),
    /// Verified access token JWT
    Jwt(JwtAuthenticationResult),
    /// Token endpoint grant
    Grant(GrantResult),
}

impl AuthenticationResult {
    fn inner(&self) -> &dyn Authenticated {
        match self {
            Self::ApiKey(r) => r,
            Self::ClientCredentials(r) => r,
            Self::Bearer(r) => r,
            Self::Jwt(r) => r,
            Self::Grant(r) => r,
        }
    }
}

#[async_trait]
impl Authenticated for AuthenticationResult {
    fn account_href(&self) -> Option<&str> {
        self.inner().account_href()
    }

    fn application_href(&self) -> Option<&str> {
        self.inner().application_href()
    }

    fn access_token(&self) -> Option<&str> {
        self.inner().access_token()
    }

    fn token_response(&self) -> Option<&TokenResponse> {
        self.inner().token_response()
    }

    fn scopes(&self) -> Vec<String> {
        self.inner().scopes()
    }

    async fn account(&self, client: &Client) -> Result<Account> {
        self.inner().account(client).await
    }
}

impl From<ApiAuthenticationResult> for AuthenticationResult {
    fn from(r: ApiAuthenticationResult) -> Self {
        Self::ApiKey(r)
    }
}

impl From<ClientCredentialsResult> for AuthenticationResult {
    fn from(r: ClientCredentialsResult) -> Self {
        Self::ClientCredentials(r)
    }
}

impl From<BearerAuthenticationResult> for AuthenticationResult {
    fn from(r: BearerAuthenticationResult) -> Self {
        Self::Bearer(r)
    }
}

impl From<JwtAuthenticationResult> for AuthenticationResult {
    fn from(r: JwtAuthenticationResult) -> Self {
        Self::Jwt(r)
    }
}

impl From<GrantResult> for AuthenticationResult {
    fn from(r: GrantResult) -> Self {
        Self::Grant(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grant_result_splits_scope() {
        let result = AuthenticationResult::from(GrantResult {
            kind: GrantKind::Password,
            application_href: "https://api/v1/applications/app".into(),
            token_response: TokenResponse::bearer("t", 60, Some("read  write".into())),
            account_href: Some("https://api/v1/accounts/1".into()),
        });

        assert_eq!(result.scopes(), vec!["read".to_string(), "write".to_string()]);
        assert_eq!(result.access_token(), Some("t"));
        assert_eq!(result.account_href(), Some("https://api/v1/accounts/1"));
        assert!(result.token_response().is_some());
    }

    #[test]
    fn jwt_result_exposes_claim_scope() {
        let result = JwtAuthenticationResult {
            jwt: "a.b.c".into(),
            claims: json!({"scope": "admin"}).as_object().cloned().unwrap(),
            account_href: "https://api/v1/accounts/1".into(),
            application_href: None,
            local_validation: true,
            access_token: None,
        };
        assert_eq!(result.scopes(), vec!["admin".to_string()]);
        assert_eq!(result.token_response(), None);
    }
}
