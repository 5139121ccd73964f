//! Identity Client Library
//!
//! Client SDK for a hosted identity API, focused on authentication.
//!
//! # Features
//!
//! - **API key authentication**: HTTP Basic, and a local client-credentials
//!   exchange issuing signed bearer tokens
//! - **Access tokens**: HS256 verification with optional remote revocation
//!   checks and an administrators-directory key resolver
//! - **OAuth2 grants**: password, refresh token, client credentials, social
//!   and token grants against the application's token endpoint
//! - **Federation**: signed SAML / ID Site redirects and single-use callback
//!   verification
//! - **Resource cache**: TTL/TTI expiry per region with pluggable stores
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load(Some(Path::new("identity.yaml")))?;
//! let client = Client::from_config(&config)?;
//! let basic = BasicApiKeyAuthenticator::new(client.clone(), application_href);
//! let result = basic.authenticate(&request).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod datastore;
pub mod error;
pub mod federation;
pub mod middleware;
pub mod resource;

pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Configuration(format!("Failed to install tracing subscriber: {e}")))
}
