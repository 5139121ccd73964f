//! SAML identity provider redirect URLs.

use serde_json::{Value, json};
use tracing::debug;

use crate::auth::jwt::{self, Claims};
use crate::client::Client;
use crate::datastore::RequestOptions;
use crate::{Error, Result};

/// Optional claims for a SAML redirect
#[derive(Debug, Clone, Default)]
pub struct SamlOptions {
    /// Where the identity provider should send the user back to (`cb_uri`)
    pub callback_uri: Option<String>,
    /// Opaque state echoed on the callback
    pub state: Option<String>,
    /// Account store href to authenticate against (`ash`)
    pub account_store_href: Option<String>,
    /// Organization name key (`onk`)
    pub organization_name_key: Option<String>,
}

/// Builds signed redirects to an application's SAML identity provider
#[derive(Debug, Clone)]
pub struct SamlIdpUrlBuilder {
    client: Client,
    application_href: String,
}

impl SamlIdpUrlBuilder {
    /// Builder for `application_href`
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        Self {
            client,
            application_href: application_href.into(),
        }
    }

    /// Follow the application's SAML policy to the SSO initiation endpoint
    async fn sso_initiation_endpoint(&self) -> Result<String> {
        let application = self.client.get_application(&self.application_href).await?;
        let policy = application.saml_policy.ok_or_else(|| {
            Error::Configuration(format!(
                "application {} has no SAML policy",
                self.application_href
            ))
        })?;

        let policy: Value = self
            .client
            .get_value(&policy.href, &RequestOptions::new())
            .await?;
        let provider_href = link(&policy, "serviceProvider")?;
        let provider: Value = self
            .client
            .get_value(&provider_href, &RequestOptions::new())
            .await?;
        link(&provider, "ssoInitiationEndpoint")
    }

    /// Signed URL of the form `{endpoint}?accessToken={jwt}`
    pub async fn build(&self, options: &SamlOptions) -> Result<String> {
        let endpoint = self.sso_initiation_endpoint().await?;

        let mut claims = Claims::new();
        claims.insert("jti".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        claims.insert("iss".to_string(), json!(self.application_href));
        claims.insert("iat".to_string(), json!(self.client.clock().now_secs()));
        insert_opt(&mut claims, "cb_uri", options.callback_uri.as_ref());
        insert_opt(&mut claims, "state", options.state.as_ref());
        insert_opt(&mut claims, "ash", options.account_store_href.as_ref());
        insert_opt(&mut claims, "onk", options.organization_name_key.as_ref());

        let token = jwt::sign(
            &claims,
            self.client.api_key_secret(),
            Some(self.client.api_key_id()),
        )?;
        debug!(endpoint = %endpoint, "Built SAML redirect");
        Ok(format!("{endpoint}?accessToken={token}"))
    }
}

fn link(resource: &Value, name: &str) -> Result<String> {
    resource
        .get(name)
        .and_then(|l| l.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Configuration(format!("SAML configuration has no {name}")))
}

pub(crate) fn insert_opt(claims: &mut Claims, name: &str, value: Option<&String>) {
    if let Some(value) = value {
        claims.insert(name.to_string(), Value::String(value.clone()));
    }
}
