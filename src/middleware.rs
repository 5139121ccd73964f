//! Axum integration
//!
//! [`auth_middleware`] authenticates every request with a
//! [`RequestAuthenticator`] and stores the [`AuthenticationResult`] in the
//! request extensions for downstream handlers.
//!
//! ```ignore
//! let auth = AuthLayerState::new(Arc::new(ApiRequestAuthenticator::new(&client, app)));
//! let app = Router::new()
//!     .route("/resource", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(auth, auth_middleware));
//! ```

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::Error;
use crate::auth::{AuthRequest, AuthenticationResult, RequestAuthenticator};

/// Largest form body read to look for credentials
const MAX_FORM_BODY: usize = 64 * 1024;

/// State shared by the middleware
#[derive(Clone)]
pub struct AuthLayerState {
    authenticator: Arc<dyn RequestAuthenticator>,
    public_paths: Arc<Vec<String>>,
}

impl AuthLayerState {
    /// Authenticate every path with `authenticator`
    pub fn new(authenticator: Arc<dyn RequestAuthenticator>) -> Self {
        Self {
            authenticator,
            public_paths: Arc::new(Vec::new()),
        }
    }

    /// Paths (prefixes) that bypass authentication
    #[must_use]
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = Arc::new(paths);
        self
    }

    /// Check if a path is public
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }
}

fn is_form(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

/// Convert the head of an axum request (plus a parsed form body)
fn auth_request(request: &Request<Body>, form: Map<String, Value>) -> AuthRequest {
    let mut auth = AuthRequest::new(request.uri().to_string())
        .method(request.method().as_str())
        .body(form);
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            auth = auth.header(name.as_str(), value);
        }
    }
    auth
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AuthLayerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.is_public_path(&path) {
        return next.run(request).await;
    }

    // Form bodies may carry access_token / grant_type, so buffer and restore them.
    let (mut request, form) = if is_form(&request) {
        let (parts, body) = request.into_parts();
        let bytes = match to_bytes(body, MAX_FORM_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read request body");
                return error_response(&Error::MalformedRequest(
                    "request body is too large".to_string(),
                ));
            }
        };
        let form: Map<String, Value> = url::form_urlencoded::parse(&bytes)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        (Request::from_parts(parts, Body::from(bytes)), form)
    } else {
        (request, Map::new())
    };

    let auth = auth_request(&request, form);
    match state.authenticator.authenticate_request(&auth).await {
        Ok(result) => {
            debug!(path = %path, "Authenticated request");
            request.extensions_mut().insert::<AuthenticationResult>(result);
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Authentication failed");
            error_response(&e)
        }
    }
}

/// JSON error document `{status, code, message}` with the error's status
pub fn error_response(error: &Error) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(json!({
        "status": status.as_u16(),
        "code": error.code(),
        "message": error.user_message(),
    }));
    if status == StatusCode::UNAUTHORIZED {
        (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
    } else {
        (status, body).into_response()
    }
}
