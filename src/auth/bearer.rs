//! Local verification of bearer tokens issued by the Basic exchange.
//!
//! The token must be signed with the tenant secret and carry numeric
//! `timestamp` and `expires_in` claims plus a string `client_id`. Tokens in
//! the exchange's own `sub`/`iat`/`exp` form are normalized to that shape
//! first.

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::jwt::{self, Claims};
use super::request::AuthRequest;
use super::result::BearerAuthenticationResult;
use crate::client::Client;
use crate::resource::Status;
use crate::{Error, Result};

fn invalid(reason: &str) -> Error {
    Error::InvalidRequest(reason.to_string())
}

/// Rewrite `sub`/`iat`/`exp` claims as `client_id`/`timestamp`/`expires_in`
/// unless the token already uses the latter.
fn normalize(mut claims: Claims) -> Claims {
    if !claims.contains_key("client_id") {
        if let Some(sub) = claims.get("sub").cloned() {
            claims.insert("client_id".to_string(), sub);
        }
    }
    if !claims.contains_key("timestamp") {
        if let Some(iat) = jwt::claim_i64(&claims, "iat") {
            claims.insert("timestamp".to_string(), json!(iat));
            if !claims.contains_key("expires_in") {
                if let Some(lifetime) =
                    jwt::claim_i64(&claims, "exp").and_then(|exp| exp.checked_sub(iat))
                {
                    claims.insert("expires_in".to_string(), json!(lifetime));
                }
            }
        }
    }
    claims
}

/// Verifies bearer tokens against the tenant secret and the key they name
#[derive(Debug, Clone)]
pub struct BearerTokenAuthenticator {
    client: Client,
    application_href: String,
}

impl BearerTokenAuthenticator {
    /// Authenticator for tokens issued by `application_href`
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        Self {
            client,
            application_href: application_href.into(),
        }
    }

    /// Authenticate the bearer token carried by `request`
    pub async fn authenticate(&self, request: &AuthRequest) -> Result<BearerAuthenticationResult> {
        let token = request
            .bearer_token()
            .ok_or_else(|| invalid("missing bearer token"))?;
        self.authenticate_token(&token).await
    }

    /// Authenticate a raw token
    #[instrument(skip_all, fields(token = %jwt::fingerprint(token)))]
    pub async fn authenticate_token(&self, token: &str) -> Result<BearerAuthenticationResult> {
        let verified = jwt::verify(token, self.client.api_key_secret()).map_err(|e| {
            debug!(error = %e, "Bearer token failed verification");
            invalid("access token is invalid")
        })?;
        let claims = normalize(verified.claims);

        let timestamp = claims
            .get("timestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("access token is missing a numeric timestamp"))?;
        let expires_in = claims
            .get("expires_in")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("access token is missing a numeric expires_in"))?;
        let client_id = jwt::claim_str(&claims, "client_id")
            .ok_or_else(|| invalid("access token is missing client_id"))?
            .to_string();

        if timestamp.saturating_add(expires_in) < self.client.clock().now_secs() {
            debug!(client_id = %client_id, "Bearer token expired");
            return Err(Error::Expired);
        }

        let granted_scopes = match claims.get("scope") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(scope)) => scope.split_whitespace().map(str::to_string).collect(),
            Some(_) => return Err(invalid("access token scope must be a string")),
        };

        let api_key = self
            .client
            .get_api_key(&self.application_href, &client_id)
            .await
            .map_err(|e| {
                debug!(client_id = %client_id, error = %e, "API key lookup failed");
                invalid("access token is invalid")
            })?;
        if api_key.status == Status::Disabled {
            warn!(client_id = %client_id, "Bearer token names a disabled API key");
            return Err(invalid("access token is invalid"));
        }

        debug!(client_id = %client_id, scopes = ?granted_scopes, "Bearer authentication succeeded");
        Ok(BearerAuthenticationResult {
            api_key,
            application_href: self.application_href.clone(),
            token: token.to_string(),
            claims,
            granted_scopes,
        })
    }
}
