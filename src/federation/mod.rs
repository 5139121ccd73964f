//! SAML and ID Site federation
//!
//! Redirects are signed JWTs built by [`SamlIdpUrlBuilder`] and
//! [`IdSiteUrlBuilder`]. The identity provider answers on the callback URI
//! with a `jwtResponse` query parameter, which [`CallbackHandler`] verifies:
//! signature, audience, expiry, and a single-use nonce.

mod id_site;
mod nonce;
mod saml;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::jwt;
use crate::client::Client;
use crate::resource::Account;
use crate::{Error, Result};

pub use id_site::{IdSiteOptions, IdSiteUrlBuilder};
pub use nonce::{CacheNonceStore, NonceStore};
pub use saml::{SamlIdpUrlBuilder, SamlOptions};

/// Query parameter carrying the callback token
pub const JWT_RESPONSE_PARAM: &str = "jwtResponse";

/// Outcome reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackStatus {
    /// User logged in
    Authenticated,
    /// User registered
    Registered,
    /// User logged out
    Logout,
    /// Any other status string
    #[serde(other)]
    Unknown,
}

/// Verified callback
#[derive(Debug, Clone)]
pub struct CallbackResult {
    /// Asserted account; `None` on logout
    pub account: Option<Account>,
    /// State passed when the redirect was built
    pub state: Option<String>,
    /// `true` when the account was just created
    pub is_new: bool,
    /// Reported status
    pub status: CallbackStatus,
}

/// Verifies ID Site and SAML callbacks
#[derive(Debug, Clone)]
pub struct CallbackHandler {
    client: Client,
    nonces: Arc<dyn NonceStore>,
}

impl CallbackHandler {
    /// Handler recording nonces in the client's `idSiteNonces` region
    pub fn new(client: Client) -> Result<Self> {
        let nonces = Arc::new(CacheNonceStore::for_client(&client)?);
        Ok(Self { client, nonces })
    }

    /// Use a different nonce store
    #[must_use]
    pub fn with_nonce_store(mut self, nonces: Arc<dyn NonceStore>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Verify the ID Site callback at `response_uri`
    #[instrument(skip_all, fields(kind = "id_site"))]
    pub async fn handle_id_site_callback(&self, response_uri: &str) -> Result<CallbackResult> {
        self.handle(response_uri).await
    }

    /// Verify the SAML callback at `response_uri`
    #[instrument(skip_all, fields(kind = "saml"))]
    pub async fn handle_saml_callback(&self, response_uri: &str) -> Result<CallbackResult> {
        self.handle(response_uri).await
    }

    async fn handle(&self, response_uri: &str) -> Result<CallbackResult> {
        let token = jwt_response(response_uri)?;
        let verified = jwt::verify(&token, self.client.api_key_secret()).map_err(|e| {
            debug!(error = %e, "Callback token failed verification");
            Error::Unauthenticated("callback token is invalid".to_string())
        })?;
        let claims = verified.claims;

        if let Some(err) = claims.get("err") {
            return Err(remote_callback_error(err));
        }

        let audience = jwt::claim_str(&claims, "aud").unwrap_or_default();
        if audience != self.client.api_key_id() {
            return Err(Error::InvalidAudience {
                expected: self.client.api_key_id().to_string(),
                actual: audience.to_string(),
            });
        }

        let exp = jwt::claim_i64(&claims, "exp")
            .ok_or_else(|| Error::Unauthenticated("callback token has no exp".to_string()))?;
        if exp < self.client.clock().now_secs() {
            return Err(Error::Expired);
        }

        let nonce = jwt::claim_str(&claims, "irt")
            .ok_or_else(|| Error::Unauthenticated("callback token has no irt".to_string()))?;
        if self.nonces.exists(nonce).await? {
            warn!(nonce, "Callback nonce replayed");
            return Err(Error::AlreadyUsed(nonce.to_string()));
        }
        if let Err(e) = self.nonces.put(nonce).await {
            warn!(nonce, error = %e, "Failed to record callback nonce");
        }

        let status = claims
            .get("status")
            .cloned()
            .and_then(|s| serde_json::from_value::<CallbackStatus>(s).ok())
            .unwrap_or(CallbackStatus::Unknown);
        let is_new = claims
            .get("isNewSub")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let state = jwt::claim_str(&claims, "state").map(str::to_string);

        let account = match jwt::claim_str(&claims, "sub") {
            Some(href) if status != CallbackStatus::Logout => {
                Some(self.client.get_account(href).await?)
            }
            _ => None,
        };

        debug!(status = ?status, is_new, "Callback verified");
        Ok(CallbackResult {
            account,
            state,
            is_new,
            status,
        })
    }
}

/// Extract the `jwtResponse` parameter from an absolute or relative URI
fn jwt_response(response_uri: &str) -> Result<String> {
    let url = Url::parse(response_uri)
        .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(response_uri)))
        .map_err(|e| Error::MalformedRequest(format!("invalid callback URI: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == JWT_RESPONSE_PARAM)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| {
            Error::MalformedRequest(format!("callback URI has no {JWT_RESPONSE_PARAM}"))
        })
}

/// Error JWTs carry `{err: {status, code, message}}`
fn remote_callback_error(err: &Value) -> Error {
    let status = err
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(400);
    let code = err
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok())
        .unwrap_or(0);
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("identity provider reported an error");
    Error::remote(status, code, message)
}
