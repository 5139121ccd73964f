//! Framework-agnostic view of an inbound HTTP request.
//!
//! Authenticators read credentials from the `Authorization` header, the
//! `access_token` cookie, the query string and form/JSON body fields. The
//! [`middleware`](crate::middleware) builds an [`AuthRequest`] from an axum
//! request; other integrations can build one by hand or from JSON.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use url::Url;

use crate::{Error, Result};

/// Name of the cookie, query parameter and body field carrying a bearer token
pub const ACCESS_TOKEN_FIELD: &str = "access_token";

/// Inbound request: `{method?, url, headers, body?}`
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    method: Option<String>,
    url: String,
    headers: HashMap<String, String>,
    body: Map<String, Value>,
}

impl AuthRequest {
    /// Request for `url` (absolute, or a path with optional query string)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build from a JSON object shaped like `{headers, url, method?, body?}`.
    ///
    /// `headers` must be an object and `url` a string; anything else is a
    /// [`Error::MalformedRequest`].
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::MalformedRequest("request must be an object".to_string()))?;

        let headers = object
            .get("headers")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MalformedRequest("request.headers must be an object".to_string()))?;
        let url = object
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRequest("request.url must be a string".to_string()))?;

        let mut request = Self::new(url);
        for (name, value) in headers {
            let Some(value) = value.as_str() else {
                return Err(Error::MalformedRequest(format!(
                    "header {name} must be a string"
                )));
            };
            request = request.header(name, value);
        }

        match object.get("method") {
            None | Some(Value::Null) => {}
            Some(Value::String(method)) => request = request.method(method),
            Some(_) => {
                return Err(Error::MalformedRequest(
                    "request.method must be a string".to_string(),
                ));
            }
        }

        match object.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::Object(body)) => request = request.body(body.clone()),
            Some(_) => {
                return Err(Error::MalformedRequest(
                    "request.body must be an object".to_string(),
                ));
            }
        }

        Ok(request)
    }

    /// Set the HTTP method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into().to_ascii_uppercase());
        self
    }

    /// Add a header (names are case-insensitive)
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Replace the parsed body
    #[must_use]
    pub fn body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Add one body field
    #[must_use]
    pub fn body_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(name.into(), Value::String(value.into()));
        self
    }

    /// HTTP method, when known
    #[must_use]
    pub fn get_method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Request URL as given
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Header value
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// First query string value for `name`
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let url = Url::parse(&self.url)
            .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(&self.url)))
            .ok()?;
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Cookie value from the `Cookie` header
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header_value("cookie")?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
    }

    /// String body field
    #[must_use]
    pub fn body_str(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }

    /// Body field, falling back to the query string
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.body_str(name)
            .map(str::to_string)
            .or_else(|| self.query_param(name))
    }

    /// Decode `Authorization: Basic base64(id:secret)`.
    ///
    /// The decoded value must split on `:` into exactly two parts.
    pub fn basic_credentials(&self) -> Result<BasicCredentials> {
        let header = self
            .header_value("authorization")
            .ok_or_else(|| Error::InvalidRequest("missing Authorization header".to_string()))?;

        let (scheme, encoded) = header
            .split_once(' ')
            .ok_or_else(|| Error::InvalidRequest("malformed Authorization header".to_string()))?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(Error::InvalidRequest(
                "Authorization scheme is not Basic".to_string(),
            ));
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| Error::InvalidRequest("Basic credentials are not valid base64".to_string()))?;

        let parts: Vec<&str> = decoded.split(':').collect();
        let [id, secret] = parts.as_slice() else {
            return Err(Error::InvalidRequest(
                "Basic credentials must be id:secret".to_string(),
            ));
        };

        Ok(BasicCredentials {
            id: (*id).to_string(),
            secret: (*secret).to_string(),
        })
    }

    /// `true` when the `Authorization` header uses `scheme`
    #[must_use]
    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.header_value("authorization")
            .and_then(|h| h.split_once(' '))
            .is_some_and(|(s, _)| s.eq_ignore_ascii_case(scheme))
    }

    /// Bearer token from the `Authorization` header, the body, the query
    /// string or the `access_token` cookie, in that order
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        if let Some((scheme, token)) = self
            .header_value("authorization")
            .and_then(|h| h.split_once(' '))
        {
            if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
        self.param(ACCESS_TOKEN_FIELD)
            .or_else(|| self.cookie(ACCESS_TOKEN_FIELD))
            .filter(|t| !t.is_empty())
    }
}

/// Decoded Basic credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// API key id
    pub id: String,
    /// API key secret
    pub secret: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}
