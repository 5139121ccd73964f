//! Configuration management
//!
//! Sources are layered with `figment`: built-in defaults, then an optional
//! YAML file, then `IDENTITY_*` environment variables (`__` separates nested
//! keys, e.g. `IDENTITY_API_KEY__SECRET`).

use std::{collections::HashMap, env, fs, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{DEFAULT_TTI_SECS, DEFAULT_TTL_SECS, regions};
use crate::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.stormpath.com/v1";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API base URL (no trailing slash)
    pub base_url: String,
    /// Tenant API key used to call the API and to sign/verify tokens
    pub api_key: ApiKeyConfig,
    /// Resource cache configuration
    pub cache: CacheConfig,
    /// Authenticator defaults
    pub authentication: AuthenticationConfig,
    /// Logging configuration
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: ApiKeyConfig::default(),
            cache: CacheConfig::default(),
            authentication: AuthenticationConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Tenant API key
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// Key id (supports `env:VAR_NAME`)
    pub id: String,
    /// Key secret (supports `env:VAR_NAME`)
    pub secret: String,
    /// Optional `apiKey.properties` file with `apiKey.id` / `apiKey.secret`
    pub file: Option<String>,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("file", &self.file)
            .finish()
    }
}

impl ApiKeyConfig {
    /// Resolve `env:VAR` references and fill blanks from the properties file
    pub fn resolve(&self) -> Result<(String, String)> {
        let mut id = resolve_env(&self.id);
        let mut secret = resolve_env(&self.secret);

        if let Some(ref file) = self.file {
            let (file_id, file_secret) = read_properties(Path::new(file))?;
            if id.is_empty() {
                id = file_id.unwrap_or_default();
            }
            if secret.is_empty() {
                secret = file_secret.unwrap_or_default();
            }
        }

        if id.is_empty() || secret.is_empty() {
            return Err(Error::Configuration(
                "api_key.id and api_key.secret are required".to_string(),
            ));
        }
        Ok((id, secret))
    }
}

fn resolve_env(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Parse an `apiKey.properties` file (`key = value` lines, `#` comments)
fn read_properties(path: &Path) -> Result<(Option<String>, Option<String>)> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Cannot read API key file {}: {e}", path.display()))
    })?;

    let mut id = None;
    let mut secret = None;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        match key.trim() {
            "apiKey.id" => id = Some(value.trim().to_string()),
            "apiKey.secret" => secret = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Ok((id, secret))
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable resource caching
    pub enabled: bool,
    /// Default time-to-live in seconds
    pub default_ttl: u64,
    /// Default time-to-idle in seconds
    pub default_tti: u64,
    /// Per-region overrides keyed by region name
    pub regions: HashMap<String, RegionConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut overrides = HashMap::new();
        // Nonces must outlive the callback tokens they guard, read or not.
        overrides.insert(
            regions::ID_SITE_NONCES.to_string(),
            RegionConfig {
                ttl: Some(3600),
                tti: Some(3600),
            },
        );
        Self {
            enabled: true,
            default_ttl: DEFAULT_TTL_SECS,
            default_tti: DEFAULT_TTI_SECS,
            regions: overrides,
        }
    }
}

impl CacheConfig {
    /// `(ttl, tti)` for `region`, falling back to the defaults
    #[must_use]
    pub fn expiry_for(&self, region: &str) -> (u64, u64) {
        let overrides = self.regions.get(region);
        (
            overrides
                .and_then(|r| r.ttl)
                .unwrap_or(self.default_ttl),
            overrides
                .and_then(|r| r.tti)
                .unwrap_or(self.default_tti),
        )
    }
}

/// Expiry override for one region
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Time-to-live in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Time-to-idle in seconds
    #[serde(default)]
    pub tti: Option<u64>,
}

/// Authenticator defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Trust signature + expiry only and skip the remote revocation check
    pub local_validation: bool,
    /// Lifetime in seconds of tokens issued by the Basic exchange
    pub token_ttl: u64,
    /// Directory whose accounts' API keys may sign tenant-wide tokens
    pub administrators_directory: Option<String>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            local_validation: false,
            token_ttl: 3600,
            administrators_directory: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `text` or `json`
    pub format: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("IDENTITY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the base URL and that an API key can be resolved
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Configuration(format!("Invalid base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        self.api_key.resolve()?;
        Ok(())
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }
}
