//! Response construction.
//!
//! # Responsibilities
//! - Turn a `ProxiedResponse` into a streaming HTTP response
//! - Render `ProxyError` as a JSON error body
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - An error after headers are sent aborts the body, which aborts the
//!   connection; the caller never sees a truncated body as complete
//! - Error messages never reveal resolved internal addresses

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{ProxyError, UpstreamError, ValidationError};
use crate::fetch::ProxiedResponse;

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let headers = self.headers.to_header_map();
        let mut response = Response::new(Body::from_stream(self.body));
        *response.headers_mut() = headers;
        response
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Caller-facing message for an error.
pub fn public_message(error: &ProxyError) -> String {
    match error {
        ProxyError::Validation(ValidationError::PrivateAddress { host, .. }) => {
            format!("host '{host}' resolves to a private network address")
        }
        ProxyError::Upstream(UpstreamError::RedirectRejected {
            hop,
            source: ValidationError::PrivateAddress { .. },
        }) => format!("redirect hop {hop} points to a private network address"),
        ProxyError::Upstream(UpstreamError::Transport(_)) => {
            "could not complete the upstream request".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: public_message(&self),
        };
        let mut response = (self.status(), Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn error_body_shape() {
        let response = ProxyError::from(ValidationError::DisallowedProtocol("ftp".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "validation");
        assert_eq!(json["message"], "protocol 'ftp' is not allowed for this host");
    }

    #[test]
    fn private_addresses_are_not_echoed() {
        let err = ProxyError::from(ValidationError::PrivateAddress {
            host: "evil.example".into(),
            address: "10.1.2.3".into(),
        });
        let message = public_message(&err);
        assert!(message.contains("evil.example"));
        assert!(!message.contains("10.1.2.3"));

        let err = ProxyError::from(UpstreamError::RedirectRejected {
            hop: 1,
            source: ValidationError::PrivateAddress {
                host: "169.254.169.254".into(),
                address: "169.254.169.254".into(),
            },
        });
        assert!(!public_message(&err).contains("169.254"));
    }

    #[test]
    fn too_large_status() {
        let response = ProxyError::TooLarge { limit: 1, declared: Some(2) }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
