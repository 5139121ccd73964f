//! End-to-end SAML and ID Site tests
//!
//! Tests cover:
//! - Redirect URLs and the signed requests they carry
//! - Callback verification: signature, audience, expiry
//! - Single-use callback nonces
//! - Error and logout callbacks

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use common::{APP, BASE, MockApi, TENANT_KEY_ID, TENANT_SECRET, advance, client, now_secs};
use identity_client::Error;
use identity_client::auth::jwt::{self, Claims};
use identity_client::federation::{
    CallbackHandler, CallbackStatus, IdSiteOptions, IdSiteUrlBuilder, SamlIdpUrlBuilder,
    SamlOptions,
};

const ACCOUNT: &str = "https://api.example.com/v1/accounts/alice";

fn api_with_account() -> std::sync::Arc<MockApi> {
    let api = MockApi::new();
    api.insert(json!({
        "href": ACCOUNT,
        "username": "alice",
        "email": "alice@example.com",
        "status": "ENABLED"
    }));
    api
}

fn callback_claims(irt: &str) -> Claims {
    json!({
        "iss": "https://idsite.example.com",
        "sub": ACCOUNT,
        "aud": TENANT_KEY_ID,
        "exp": now_secs() + 3600,
        "iat": now_secs(),
        "irt": irt,
        "state": "return-to=/dashboard",
        "isNewSub": false,
        "status": "AUTHENTICATED"
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn callback_uri(claims: &Claims) -> String {
    let token = jwt::sign(claims, TENANT_SECRET, Some(TENANT_KEY_ID)).unwrap();
    format!("https://app.example.com/callback?jwtResponse={token}")
}

fn query_param(url: &str, name: &str) -> String {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

// ============================================================================
// Callbacks
// ============================================================================

/// Test that a valid callback yields the asserted account
#[tokio::test]
async fn test_callback_authenticates_account() {
    let api = api_with_account();
    let (client, _clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();

    let result = handler
        .handle_id_site_callback(&callback_uri(&callback_claims("nonce-1")))
        .await
        .unwrap();

    assert_eq!(result.status, CallbackStatus::Authenticated);
    assert_eq!(result.state.as_deref(), Some("return-to=/dashboard"));
    assert!(!result.is_new);
    assert_eq!(result.account.unwrap().href, ACCOUNT);
}

/// Test that a callback can only be used once
#[tokio::test]
async fn test_callback_replay_is_rejected() {
    // GIVEN: a callback that was already handled
    let api = api_with_account();
    let (client, clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();
    let uri = callback_uri(&callback_claims("nonce-1"));
    handler.handle_id_site_callback(&uri).await.unwrap();

    // WHEN: it is replayed, even well after the default cache lifetime
    advance(&clock, 400);
    let err = handler.handle_id_site_callback(&uri).await.unwrap_err();

    // THEN: the nonce is recognised
    assert!(matches!(err, Error::AlreadyUsed(ref n) if n == "nonce-1"));
    assert_eq!(err.code(), 10012);

    // AND: a fresh nonce still works, through the SAML entry point too
    let fresh = callback_uri(&callback_claims("nonce-2"));
    assert!(handler.handle_saml_callback(&fresh).await.is_ok());
}

/// Test that callbacks for another API key are rejected
#[tokio::test]
async fn test_callback_wrong_audience() {
    let api = api_with_account();
    let (client, _clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();

    let mut claims = callback_claims("nonce-1");
    claims.insert("aud".into(), "SOMEONE-ELSE".into());

    let err = handler
        .handle_id_site_callback(&callback_uri(&claims))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAudience { ref expected, ref actual }
            if expected == TENANT_KEY_ID && actual == "SOMEONE-ELSE"
    ));
}

/// Test that expired callbacks are rejected
#[tokio::test]
async fn test_callback_expired() {
    let api = api_with_account();
    let (client, clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();
    let uri = callback_uri(&callback_claims("nonce-1"));

    advance(&clock, 3601);
    let err = handler.handle_id_site_callback(&uri).await.unwrap_err();
    assert!(matches!(err, Error::Expired));
}

/// Test that forged and malformed callbacks are rejected
#[tokio::test]
async fn test_callback_signature_and_shape() {
    let api = api_with_account();
    let (client, _clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();

    let forged = jwt::sign(&callback_claims("nonce-1"), "other-secret", None).unwrap();
    let err = handler
        .handle_id_site_callback(&format!("/callback?jwtResponse={forged}"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthenticated(_)));

    let err = handler
        .handle_id_site_callback("/callback?state=x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedRequest(_)));
}

/// Test that error callbacks surface the provider's error
#[tokio::test]
async fn test_callback_error_claim() {
    let api = api_with_account();
    let (client, _clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();

    let mut claims = callback_claims("nonce-1");
    claims.insert(
        "err".into(),
        json!({"status": 400, "code": 10011, "message": "Token is invalid"}),
    );

    let err = handler
        .handle_id_site_callback(&callback_uri(&claims))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.code(), 10011);
    assert_eq!(err.user_message(), "Token is invalid");
}

/// Test that logout callbacks do not fetch the account
#[tokio::test]
async fn test_callback_logout() {
    let api = api_with_account();
    let (client, _clock) = client(&api);
    let handler = CallbackHandler::new(client).unwrap();

    let mut claims = callback_claims("nonce-1");
    claims.insert("status".into(), "LOGOUT".into());

    let result = handler
        .handle_id_site_callback(&callback_uri(&claims))
        .await
        .unwrap();
    assert_eq!(result.status, CallbackStatus::Logout);
    assert!(result.account.is_none());
    assert_eq!(api.reads_of(ACCOUNT), 0);
}

// ============================================================================
// Redirects
// ============================================================================

/// Test that ID Site redirects carry a request signed by the tenant key
#[tokio::test]
async fn test_id_site_redirect() {
    let api = MockApi::new();
    let (client, _clock) = client(&api);
    let builder = IdSiteUrlBuilder::new(client, APP);

    let url = builder
        .build(&IdSiteOptions {
            callback_uri: "https://app.example.com/callback".to_string(),
            state: Some("s1".to_string()),
            path: Some("/#/register".to_string()),
            show_organization_field: true,
            ..IdSiteOptions::default()
        })
        .unwrap();

    assert!(url.starts_with("https://api.example.com/sso?jwtRequest="));
    let verified = jwt::verify(&query_param(&url, "jwtRequest"), TENANT_SECRET).unwrap();
    assert_eq!(verified.kid(), Some(TENANT_KEY_ID));
    let claims = verified.claims;
    assert_eq!(claims["iss"], json!(TENANT_KEY_ID));
    assert_eq!(claims["sub"], json!(APP));
    assert_eq!(claims["cb_uri"], json!("https://app.example.com/callback"));
    assert_eq!(claims["state"], json!("s1"));
    assert_eq!(claims["path"], json!("/#/register"));
    assert_eq!(claims["sof"], json!(true));
    assert_eq!(claims["iat"], json!(now_secs()));
    assert!(claims.get("usd").is_none());
    assert!(claims["jti"].as_str().is_some_and(|j| !j.is_empty()));
}

/// Test ID Site logout and the required callback URI
#[tokio::test]
async fn test_id_site_logout_and_validation() {
    let api = MockApi::new();
    let (client, _clock) = client(&api);
    let builder = IdSiteUrlBuilder::new(client, APP);

    let url = builder
        .build(&IdSiteOptions {
            callback_uri: "https://app.example.com/bye".to_string(),
            logout: true,
            ..IdSiteOptions::default()
        })
        .unwrap();
    assert!(url.starts_with("https://api.example.com/sso/logout?jwtRequest="));

    let err = builder.build(&IdSiteOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedRequest(_)));
}

/// Test that SAML redirects follow the application's SAML policy
#[tokio::test]
async fn test_saml_redirect() {
    // GIVEN: an application with a SAML policy and service provider
    let api = MockApi::new();
    let policy = format!("{BASE}/samlPolicies/p1");
    let provider = format!("{BASE}/samlServiceProviders/sp1");
    let endpoint = format!("{provider}/ssoInitiationEndpoint");
    api.insert(json!({"href": APP, "name": "My App", "samlPolicy": {"href": policy}}));
    api.insert(json!({"href": policy, "serviceProvider": {"href": provider}}));
    api.insert(json!({"href": provider, "ssoInitiationEndpoint": {"href": endpoint}}));
    let (client, _clock) = client(&api);

    // WHEN: a redirect is built
    let url = SamlIdpUrlBuilder::new(client, APP)
        .build(&SamlOptions {
            callback_uri: Some("https://app.example.com/saml".to_string()),
            state: Some("s2".to_string()),
            ..SamlOptions::default()
        })
        .await
        .unwrap();

    // THEN: it targets the endpoint with a signed request from the application
    assert!(url.starts_with(&format!("{endpoint}?accessToken=")));
    let verified = jwt::verify(&query_param(&url, "accessToken"), TENANT_SECRET).unwrap();
    assert_eq!(verified.kid(), Some(TENANT_KEY_ID));
    assert_eq!(verified.claims["iss"], json!(APP));
    assert_eq!(verified.claims["cb_uri"], json!("https://app.example.com/saml"));
    assert_eq!(verified.claims["state"], json!("s2"));
    assert!(verified.claims.get("ash").is_none());
    assert_eq!(verified.claims["jti"].as_str().map(str::len), Some(36));
}

/// Test that applications without a SAML policy cannot build redirects
#[tokio::test]
async fn test_saml_requires_policy() {
    let api = MockApi::new();
    api.insert(json!({"href": APP, "name": "My App"}));
    let (client, _clock) = client(&api);

    let err = SamlIdpUrlBuilder::new(client, APP)
        .build(&SamlOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

/// Test that the configured nonce lifetime outlives the callback window
#[test]
fn test_nonce_region_lifetime() {
    let config = identity_client::config::CacheConfig::default();
    let (ttl, tti) = config.expiry_for("idSiteNonces");
    assert_eq!((ttl, tti), (3600, 3600));
}
