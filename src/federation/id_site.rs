//! ID Site redirect URLs.

use serde_json::json;
use tracing::debug;
use url::Url;

use super::saml::insert_opt;
use crate::auth::jwt::{self, Claims};
use crate::client::Client;
use crate::{Error, Result};

/// Options for an ID Site redirect
#[derive(Debug, Clone, Default)]
pub struct IdSiteOptions {
    /// Where ID Site sends the user back to (`cb_uri`), required
    pub callback_uri: String,
    /// Opaque state echoed on the callback
    pub state: Option<String>,
    /// ID Site path to open (e.g. `/#/register`)
    pub path: Option<String>,
    /// Organization name key (`onk`)
    pub organization_name_key: Option<String>,
    /// Show the organization field (`sof`)
    pub show_organization_field: bool,
    /// Use the organization subdomain (`usd`)
    pub use_subdomain: bool,
    /// Account store href (`ash`)
    pub account_store_href: Option<String>,
    /// Build a logout URL instead of a login URL
    pub logout: bool,
}

/// Builds signed redirects to ID Site
#[derive(Debug, Clone)]
pub struct IdSiteUrlBuilder {
    client: Client,
    application_href: String,
}

impl IdSiteUrlBuilder {
    /// Builder for `application_href`
    pub fn new(client: Client, application_href: impl Into<String>) -> Self {
        Self {
            client,
            application_href: application_href.into(),
        }
    }

    /// Signed URL `{origin}/sso[/logout]?jwtRequest={jwt}`
    pub fn build(&self, options: &IdSiteOptions) -> Result<String> {
        if options.callback_uri.trim().is_empty() {
            return Err(Error::MalformedRequest("callback_uri is required".to_string()));
        }

        let application = Url::parse(&self.application_href).map_err(|e| {
            Error::Configuration(format!("invalid application href: {e}"))
        })?;
        let origin = application.origin().ascii_serialization();

        let mut claims = Claims::new();
        claims.insert("jti".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        claims.insert("iat".to_string(), json!(self.client.clock().now_secs()));
        claims.insert("iss".to_string(), json!(self.client.api_key_id()));
        claims.insert("sub".to_string(), json!(self.application_href));
        claims.insert("cb_uri".to_string(), json!(options.callback_uri));
        insert_opt(&mut claims, "state", options.state.as_ref());
        insert_opt(&mut claims, "path", options.path.as_ref());
        insert_opt(&mut claims, "onk", options.organization_name_key.as_ref());
        insert_opt(&mut claims, "ash", options.account_store_href.as_ref());
        if options.show_organization_field {
            claims.insert("sof".to_string(), json!(true));
        }
        if options.use_subdomain {
            claims.insert("usd".to_string(), json!(true));
        }

        let token = jwt::sign(
            &claims,
            self.client.api_key_secret(),
            Some(self.client.api_key_id()),
        )?;
        let path = if options.logout { "/sso/logout" } else { "/sso" };
        debug!(logout = options.logout, "Built ID Site redirect");
        Ok(format!("{origin}{path}?jwtRequest={token}"))
    }
}
