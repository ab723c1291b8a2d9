//! HTTP middleware
//!
//! API-key auth and per-key rate limiting for the route groups that need
//! them. Auth stashes the accepted key on the request so the rate limiter
//! downstream can bucket by it.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use super::AppState;

/// API key accepted for the current request.
#[derive(Debug, Clone)]
pub struct ApiKey(pub String);

/// Pull the key from the X-API-Key header, falling back to the api_key
/// query parameter (the query form is what `<img src="...">` tags use).
fn extract_api_key(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get("x-api-key") {
        if let Ok(key) = value.to_str() {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }

    let query = request.uri().query()?;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if name == "api_key" && !value.is_empty() {
            return Some(value.into_owned());
        }
    }
    None
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

/// Validate the caller's API key against the configured list.
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_api_key(&request) else {
        return unauthorized("missing API key");
    };

    if !state.config.auth.api_keys.iter().any(|k| k == &key) {
        return unauthorized("invalid API key");
    }

    request.extensions_mut().insert(ApiKey(key));
    next.run(request).await
}

/// Validate an admin API key. A key that is present but not on the admin
/// list is rejected with 403 rather than 401.
pub async fn admin_key_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_api_key(&request) else {
        return unauthorized("missing admin API key");
    };

    if !state.config.auth.admin_keys.iter().any(|k| k == &key) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "invalid admin API key" })),
        )
            .into_response();
    }

    request.extensions_mut().insert(ApiKey(key));
    next.run(request).await
}

/// Per-API-key token bucket rate limiting. Requests without a stashed key
/// (routes where auth does not run) pass through untouched.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ApiKey(key)) = request.extensions().get::<ApiKey>().cloned() else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    match state.rate_limiter.try_acquire(&key) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            warn!("Rate limit exceeded on {}", path);

            let retry_seconds = wait.as_secs_f64().ceil().max(1.0) as u64;
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "rate limit exceeded" })),
            )
                .into_response();
            response
                .headers_mut()
                .insert("Retry-After", retry_seconds.to_string().parse().unwrap());
            response
        }
    }
}
