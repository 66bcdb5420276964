//! Bearer-token authentication middleware.
//! Rejects callers before the media handler runs.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::http::response::ErrorBody;
use crate::http::server::AppState;

pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // No token configured: auth is handled elsewhere (or not at all).
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if tokens_match(token.as_bytes(), expected.as_bytes()) => next.run(req).await,
        _ => {
            warn!(path = req.uri().path(), "Rejected unauthenticated media request");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    let body = ErrorBody {
        error: "unauthorized",
        message: "missing or invalid bearer token".to_string(),
    };
    let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    response
        .headers_mut()
        .insert("www-authenticate", HeaderValue::from_static("Bearer"));
    response
}

/// Length-checked comparison without an early exit on the first mismatch.
fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
