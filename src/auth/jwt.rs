//! HS256 token helpers.
//!
//! All tokens handled by this crate are compact JWS signed with an API key
//! secret. Expiry is never checked here; callers compare claims against the
//! client [`Clock`](crate::clock::Clock) so tests can drive time.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Token claims as an open JSON object
pub type Claims = Map<String, Value>;

/// A token whose signature has been checked
#[derive(Debug, Clone)]
pub struct VerifiedJwt {
    /// JOSE header
    pub header: Header,
    /// Claims
    pub claims: Claims,
}

impl VerifiedJwt {
    /// Key id from the header
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

/// Sign `claims` with `secret`, optionally naming the key in the header
pub fn sign(claims: &Claims, secret: &str, kid: Option<&str>) -> Result<String> {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    Ok(jsonwebtoken::encode(
        &header,
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Check the signature of `token` against `secret` and return its contents
pub fn verify(token: &str, secret: &str) -> Result<VerifiedJwt> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(VerifiedJwt {
        header: data.header,
        claims: data.claims,
    })
}

/// Read the header without verifying anything
pub fn decode_header(token: &str) -> Result<Header> {
    Ok(jsonwebtoken::decode_header(token)?)
}

/// Read the claims without verifying the signature
pub fn decode_unverified(token: &str) -> Result<Claims> {
    let mut parts = token.splitn(3, '.');
    let (Some(_), Some(payload), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid_token());
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid_token())?;
    serde_json::from_slice::<Claims>(&bytes).map_err(|_| invalid_token())
}

fn invalid_token() -> Error {
    jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into()
}

/// String claim
#[must_use]
pub fn claim_str<'a>(claims: &'a Claims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Value::as_str)
}

/// Numeric claim, truncated to whole units
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn claim_i64(claims: &Claims, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// `true` when `exp` is present and earlier than `now_secs`
#[must_use]
pub fn is_expired(claims: &Claims, now_secs: i64) -> bool {
    claim_i64(claims, "exp").is_some_and(|exp| exp < now_secs)
}

/// Short, non-reversible token identifier for logs
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..9])
}
