//! Scope factories.
//!
//! A scope factory decides which scope a newly issued token carries. It is
//! registered together with the key used to re-sign tokens, so a factory can
//! never be configured without one.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::jwt::{self, Claims};
use crate::resource::Account;
use crate::Result;

/// What the scope is being decided for
#[derive(Debug, Clone, Copy)]
pub enum ScopeSubject<'a> {
    /// Account authenticated by a Basic exchange
    Account(&'a Account),
    /// Claims of a token returned by the token endpoint
    Claims(&'a Claims),
}

type FactoryFn = dyn Fn(ScopeSubject<'_>, Option<&str>) -> Result<Option<String>> + Send + Sync;

/// A scope factory plus the key tokens are re-signed with
#[derive(Clone)]
pub struct ScopeFactory {
    factory: Arc<FactoryFn>,
    signing_key: String,
}

impl fmt::Debug for ScopeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFactory").finish_non_exhaustive()
    }
}

impl ScopeFactory {
    /// Wrap `factory`; tokens it changes are re-signed with `signing_key`
    pub fn new<F>(factory: F, signing_key: impl Into<String>) -> Self
    where
        F: Fn(ScopeSubject<'_>, Option<&str>) -> Result<Option<String>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            signing_key: signing_key.into(),
        }
    }

    /// Key used to re-sign tokens
    #[must_use]
    pub fn signing_key(&self) -> &str {
        &self.signing_key
    }

    /// Ask the factory for a scope; empty answers count as none
    pub fn scope_for(&self, subject: ScopeSubject<'_>, requested: Option<&str>) -> Result<Option<String>> {
        Ok((self.factory)(subject, requested)?.filter(|s| !s.trim().is_empty()))
    }

    /// Run the factory over an issued token.
    ///
    /// The token is verified with the signing key first. Returns the
    /// re-signed token and its scope, or `None` when the factory granted no
    /// scope and the token should be used as is.
    pub fn rescope(&self, token: &str, requested: Option<&str>) -> Result<Option<(String, String)>> {
        let verified = jwt::verify(token, &self.signing_key)?;
        let Some(scope) = self.scope_for(ScopeSubject::Claims(&verified.claims), requested)? else {
            return Ok(None);
        };

        let mut claims = verified.claims;
        claims.insert("scope".to_string(), Value::String(scope.clone()));
        let resigned = jwt::sign(&claims, &self.signing_key, verified.header.kid.as_deref())?;
        debug!(token = %jwt::fingerprint(token), scope = %scope, "Token re-signed with factory scope");
        Ok(Some((resigned, scope)))
    }
}

/// Authenticators that accept a [`ScopeFactory`]
pub trait ScopeFactoryCapable: Sized {
    /// Install a factory
    fn set_scope_factory(&mut self, factory: ScopeFactory);

    /// Installed factory, if any
    fn scope_factory(&self) -> Option<&ScopeFactory>;

    /// Builder-style [`set_scope_factory`](Self::set_scope_factory)
    #[must_use]
    fn with_scope_factory<F>(mut self, factory: F, signing_key: impl Into<String>) -> Self
    where
        F: Fn(ScopeSubject<'_>, Option<&str>) -> Result<Option<String>> + Send + Sync + 'static,
    {
        self.set_scope_factory(ScopeFactory::new(factory, signing_key));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    fn token(claims: Value, secret: &str) -> String {
        jwt::sign(claims.as_object().unwrap(), secret, Some("KID")).unwrap()
    }

    #[test]
    fn rescope_adds_scope_and_keeps_kid() {
        let factory = ScopeFactory::new(
            |_, requested| Ok(requested.map(|r| format!("{r} profile"))),
            "key",
        );

        let (resigned, scope) = factory
            .rescope(&token(json!({"sub": "s"}), "key"), Some("read"))
            .unwrap()
            .unwrap();

        let verified = jwt::verify(&resigned, "key").unwrap();
        assert_eq!(scope, "read profile");
        assert_eq!(verified.claims["scope"], json!("read profile"));
        assert_eq!(verified.kid(), Some("KID"));
    }

    #[test]
    fn empty_scope_leaves_token_alone() {
        let factory = ScopeFactory::new(|_, _| Ok(Some("  ".to_string())), "key");
        assert!(factory
            .rescope(&token(json!({"sub": "s"}), "key"), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn factory_errors_propagate() {
        let factory = ScopeFactory::new(|_, _| Err(Error::Configuration("no".into())), "key");
        let err = factory
            .rescope(&token(json!({"sub": "s"}), "key"), None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn wrong_signing_key_is_rejected() {
        let factory = ScopeFactory::new(|_, _| Ok(Some("read".into())), "other");
        assert!(factory.rescope(&token(json!({"sub": "s"}), "key"), None).is_err());
    }
}
