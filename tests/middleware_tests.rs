//! End-to-end axum middleware tests
//!
//! Tests cover:
//! - Authenticated requests reaching handlers with their result attached
//! - JSON 401 responses for missing or bad credentials
//! - Public paths bypassing authentication
//! - Form-encoded token requests keeping their body for the handler

mod common;

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{APP, BASE, MockApi, basic, client};
use identity_client::auth::{ApiRequestAuthenticator, Authenticated, AuthenticationResult};
use identity_client::middleware::{AuthLayerState, auth_middleware};

async fn whoami(Extension(result): Extension<AuthenticationResult>) -> String {
    result.account_href().unwrap_or_default().to_string()
}

async fn token(Extension(result): Extension<AuthenticationResult>, body: String) -> Json<Value> {
    Json(json!({
        "token": result.token_response().map(|t| t.access_token.clone()),
        "body": body,
    }))
}

fn app(api: &Arc<MockApi>) -> Router {
    let (client, _clock) = client(api);
    let state = AuthLayerState::new(Arc::new(ApiRequestAuthenticator::new(&client, APP)))
        .with_public_paths(vec!["/health".to_string()]);
    Router::new()
        .route("/whoami", get(whoami))
        .route("/oauth/token", post(token))
        .route("/health", get(|| async { "ok" }))
        .layer(from_fn_with_state(state, auth_middleware))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Test that Basic credentials reach the handler as a result
#[tokio::test]
async fn test_authenticated_request() {
    let api = MockApi::new();
    api.add_api_key("A", "S", "ENABLED", "ENABLED");

    let response = app(&api)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header(header::AUTHORIZATION, basic("A", "S"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, format!("{BASE}/accounts/A-owner").as_bytes());
}

/// Test that missing and bad credentials get JSON errors
#[tokio::test]
async fn test_rejected_requests() {
    let api = MockApi::new();
    api.add_api_key("A", "S", "ENABLED", "ENABLED");

    // No credentials
    let response = app(&api)
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body = json_body(response).await;
    assert_eq!(body["status"], json!(401));
    assert_eq!(body["code"], json!(10017));

    // Wrong secret
    let response = app(&api)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header(header::AUTHORIZATION, basic("A", "WRONG"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], json!("Invalid API key credentials."));

    // Bad bearer token
    let response = app(&api)
        .oneshot(
            Request::builder()
                .uri("/whoami?access_token=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Test that public paths skip authentication
#[tokio::test]
async fn test_public_path() {
    let api = MockApi::new();

    let response = app(&api)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(api.total_reads(), 0);
}

/// Test that a form token request is exchanged and its body is preserved
#[tokio::test]
async fn test_form_token_request() {
    let api = MockApi::new();
    api.add_api_key("A", "S", "ENABLED", "ENABLED");

    let response = app(&api)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth/token")
                .header(header::AUTHORIZATION, basic("A", "S"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("grant_type=client_credentials"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["token"].as_str().is_some_and(|t| t.split('.').count() == 3));
    assert_eq!(body["body"], json!("grant_type=client_credentials"));

    // The issued token authenticates later requests
    let token = body["token"].as_str().unwrap().to_string();
    let response = app(&api)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
