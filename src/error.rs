//! Error types for the identity client

use std::io;

use thiserror::Error;

/// Result type alias for the identity client
pub type Result<T> = std::result::Result<T, Error>;

/// Identity client errors
///
/// Authentication failures are split by kind so callers can map them onto
/// HTTP responses with [`Error::status_code`] and [`Error::user_message`].
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or wrong-typed input (headers, url, grant request fields)
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Credentials were presented but are not acceptable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Token failed verification (signature, expiry, revocation)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Callback token was issued for a different audience
    #[error("Invalid audience: expected {expected}, got {actual}")]
    InvalidAudience {
        /// Audience this client accepts (its API key id)
        expected: String,
        /// Audience found in the token
        actual: String,
    },

    /// Callback token has expired
    #[error("Token has expired")]
    Expired,

    /// Callback nonce was already consumed
    #[error("Nonce has already been used: {0}")]
    AlreadyUsed(String),

    /// Token was issued for another application than the pinned one
    #[error("Token belongs to application {actual}, expected {expected}")]
    ApplicationMismatch {
        /// Pinned application href
        expected: String,
        /// Application href carried by the token
        actual: String,
    },

    /// The remote API answered with an error document
    #[error("Remote error {status} (code {code}): {message}")]
    RemoteLookup {
        /// HTTP status code
        status: u16,
        /// API error code (0 when absent)
        code: u32,
        /// Human readable message
        message: String,
    },

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cache entry construction or store failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// JWT encoding / decoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a remote error from its parts
    pub fn remote(status: u16, code: u32, message: impl Into<String>) -> Self {
        Self::RemoteLookup {
            status,
            code,
            message: message.into(),
        }
    }

    /// HTTP status code to report for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) | Self::InvalidRequest(_) => 400,
            Self::Unauthenticated(_)
            | Self::InvalidAudience { .. }
            | Self::Expired
            | Self::AlreadyUsed(_)
            | Self::ApplicationMismatch { .. }
            | Self::Jwt(_) => 401,
            Self::RemoteLookup { status, .. } => *status,
            _ => 500,
        }
    }

    /// API error code, mirroring the remote API's numbering where one exists
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::RemoteLookup { code, .. } => *code,
            Self::Expired => codes::EXPIRED,
            Self::AlreadyUsed(_) => codes::NONCE_ALREADY_USED,
            Self::InvalidAudience { .. } => codes::INVALID_AUDIENCE,
            Self::ApplicationMismatch { .. } => codes::APPLICATION_MISMATCH,
            Self::Unauthenticated(_) | Self::Jwt(_) => codes::INVALID_TOKEN,
            _ => 0,
        }
    }

    /// Message safe to show to end users. All credential failures share one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedRequest(msg) => msg.clone(),
            Self::InvalidRequest(_) => "Invalid API key credentials.".to_string(),
            Self::Unauthenticated(_) | Self::Jwt(_) => "Invalid access token.".to_string(),
            Self::InvalidAudience { .. } => "The token was issued for another client.".to_string(),
            Self::Expired => "The token has expired.".to_string(),
            Self::AlreadyUsed(_) => "The token has already been used.".to_string(),
            Self::ApplicationMismatch { .. } => {
                "The token is not valid for this application.".to_string()
            }
            Self::RemoteLookup { message, .. } => message.clone(),
            _ => "Internal error.".to_string(),
        }
    }

    /// `true` for 404 answers from the remote API
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RemoteLookup { status: 404, .. })
    }
}

/// Error codes shared with the remote API
pub mod codes {
    /// Token signature, shape or revocation failure
    pub const INVALID_TOKEN: u32 = 10017;
    /// Callback token expired
    pub const EXPIRED: u32 = 10011;
    /// Callback audience mismatch
    pub const INVALID_AUDIENCE: u32 = 10013;
    /// Callback nonce replayed
    pub const NONCE_ALREADY_USED: u32 = 10012;
    /// Token issued for a different application
    pub const APPLICATION_MISMATCH: u32 = 10014;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_client_errors() {
        assert_eq!(Error::MalformedRequest("x".into()).status_code(), 400);
        assert_eq!(Error::InvalidRequest("x".into()).status_code(), 400);
    }

    #[test]
    fn token_failures_are_unauthorized() {
        assert_eq!(Error::Unauthenticated("x".into()).status_code(), 401);
        assert_eq!(Error::Expired.status_code(), 401);
        assert_eq!(Error::AlreadyUsed("n".into()).status_code(), 401);
        assert_eq!(
            Error::ApplicationMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .code(),
            codes::APPLICATION_MISMATCH
        );
    }

    #[test]
    fn remote_errors_keep_status() {
        let err = Error::remote(404, 404, "not found");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.user_message(), "not found");
    }

    #[test]
    fn invalid_request_message_does_not_leak_reason() {
        let wrong_secret = Error::InvalidRequest("secret mismatch".into());
        let unknown_id = Error::InvalidRequest("api key lookup failed".into());
        assert_eq!(wrong_secret.user_message(), unknown_id.user_message());
    }
}
