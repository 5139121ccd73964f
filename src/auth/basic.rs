//! HTTP Basic API key authentication.

use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};

use super::request::{AuthRequest, BasicCredentials};
use super::result::ApiAuthenticationResult;
use crate::client::Client;
use crate::resource::{Account, ApiKey};
use crate::{Error, Result};

const INVALID_CREDENTIALS: &str = "Invalid API key credentials";

fn invalid() -> Error {
    Error::InvalidRequest(INVALID_CREDENTIALS.to_string())
}

/// Check `credentials` against the application's API keys.
///
/// Every failure (unknown key, wrong secret, disabled key or account) maps
/// to the same [`Error::InvalidRequest`].
pub(crate) async fn verify_api_key(
    client: &Client,
    application_href: &str,
    credentials: &BasicCredentials,
) -> Result<(ApiKey, Account)> {
    let key = client
        .get_api_key(application_href, &credentials.id)
        .await
        .map_err(|e| {
            debug!(key_id = %credentials.id, error = %e, "API key lookup failed");
            invalid()
        })?;

    let matches: bool = key
        .secret
        .as_bytes()
        .ct_eq(credentials.secret.as_bytes())
        .into();
    if !matches {
        warn!(key_id = %credentials.id, "API key secret mismatch");
        return Err(invalid());
    }

    if !key.status.is_enabled() {
        warn!(key_id = %credentials.id, status = ?key.status, "API key is not enabled");
        return Err(invalid());
    }

    let account = client.get_account(&key.account.href).await?;
    if !account.status.is_enabled() {
        warn!(key_id = %credentials.id, account = %account.href, "Account is not enabled");
        return Err(invalid());
    }

    Ok((key, account))
}

/// Authenticates requests carrying `Authorization: Basic base64(id:secret)`
#[derive(Debug, Clone)]
pub struct BasicApiKeyAuthenticator {
    client: Client,
    application_href: String,
}

impl BasicApiKeyAuthenticator {
    /// Authenticator for keys of `application_href`
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        Self {
            client,
            application_href: application_href.into(),
        }
    }

    /// Application whose keys are accepted
    #[must_use]
    pub fn application_href(&self) -> &str {
        &self.application_href
    }

    /// Authenticate `request`
    #[instrument(skip_all, fields(application = %self.application_href))]
    pub async fn authenticate(&self, request: &AuthRequest) -> Result<ApiAuthenticationResult> {
        let credentials = request.basic_credentials()?;
        let (api_key, account) =
            verify_api_key(&self.client, &self.application_href, &credentials).await?;

        debug!(key_id = %api_key.id, account = %account.href, "Basic authentication succeeded");
        Ok(ApiAuthenticationResult {
            api_key,
            account,
            application_href: self.application_href.clone(),
        })
    }
}
