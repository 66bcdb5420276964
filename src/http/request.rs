//! Inbound request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every request
//! - Parse the media query string
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Query parsing is lenient: unknown keys are ignored, an unknown
//!   `disposition` means attachment, an unparsable `max_bytes` means the
//!   configured default

use std::collections::HashMap;

use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::media::Disposition;

/// Header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Request ID of an inbound request, or `unknown` if none was assigned.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Caller preferences for `GET /media/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaQuery {
    pub disposition: Disposition,
    pub max_bytes: Option<u64>,
}

impl MediaQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let disposition = Disposition::from_query(params.get("disposition").map(String::as_str));
        let max_bytes = params.get("max_bytes").and_then(|raw| {
            let parsed = raw.trim().parse::<u64>().ok();
            if parsed.is_none() {
                tracing::debug!(max_bytes = %raw, "Ignoring unparsable max_bytes");
            }
            parsed
        });
        Self {
            disposition,
            max_bytes,
        }
    }
}
