//! Error taxonomy for the media proxy.
//!
//! # Classes
//! - Validation: client-caused, raised before any outbound call
//! - External-service: upstream-caused, raised after an outbound attempt
//! - Resource-limit: declared or actual transfer size over the cap
//! - Not-found: propagated from the record store
//!
//! # Design Decisions
//! - Nothing in this crate retries; the class tells the caller whether to
//! - Each class maps to exactly one HTTP status family

use axum::http::StatusCode;
use thiserror::Error;

/// Why a URL was refused by the safety validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("protocol '{0}' is not allowed for this host")]
    DisallowedProtocol(String),

    #[error("URLs with embedded credentials are not allowed")]
    EmbeddedCredentials,

    #[error("host '{0}' is not allowed")]
    DisallowedHost(String),

    #[error("host '{host}' maps to private address {address}")]
    PrivateAddress { host: String, address: String },
}

impl ValidationError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MalformedUrl(_) => "malformed_url",
            ValidationError::DisallowedProtocol(_) => "protocol",
            ValidationError::EmbeddedCredentials => "credentials",
            ValidationError::DisallowedHost(_) => "hostname",
            ValidationError::PrivateAddress { .. } => "private_address",
        }
    }
}

/// Failures attributable to the upstream or the network path to it.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("DNS resolution failed for '{host}': {reason}")]
    Dns { host: String, reason: String },

    #[error("upstream responded with status {0}")]
    Status(u16),

    #[error("redirect status {0} without a usable Location header")]
    MissingLocation(u16),

    #[error("more than {0} redirects")]
    TooManyRedirects(u32),

    #[error("redirect hop {hop} rejected: {source}")]
    RedirectRejected {
        hop: u32,
        #[source]
        source: ValidationError,
    },

    #[error("upstream timed out")]
    Timeout,

    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn reason(&self) -> &'static str {
        match self {
            UpstreamError::Dns { .. } => "dns",
            UpstreamError::Status(_) => "status",
            UpstreamError::MissingLocation(_) => "missing_location",
            UpstreamError::TooManyRedirects(_) => "redirect_limit",
            UpstreamError::RedirectRejected { .. } => "redirect_rejected",
            UpstreamError::Timeout => "timeout",
            UpstreamError::Transport(_) => "transport",
        }
    }
}

/// Top-level error for a single proxied retrieval.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("transfer exceeds the {limit} byte limit")]
    TooLarge { limit: u64, declared: Option<u64> },

    #[error("no media record for '{0}'")]
    NotFound(String),
}

impl ProxyError {
    /// Stable error kind exposed in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Validation(_) => "validation",
            ProxyError::Upstream(_) => "external_service",
            ProxyError::TooLarge { .. } => "resource_limit",
            ProxyError::NotFound(_) => "not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Finer-grained label for rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::Validation(e) => e.reason(),
            ProxyError::Upstream(e) => e.reason(),
            ProxyError::TooLarge { .. } => "too_large",
            ProxyError::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let validation = ProxyError::from(ValidationError::EmbeddedCredentials);
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.kind(), "validation");

        let timeout = ProxyError::from(UpstreamError::Timeout);
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.kind(), "external_service");

        let rejected = ProxyError::from(UpstreamError::RedirectRejected {
            hop: 1,
            source: ValidationError::DisallowedProtocol("http".into()),
        });
        assert_eq!(rejected.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(rejected.reason(), "redirect_rejected");

        let large = ProxyError::TooLarge { limit: 10, declared: Some(20) };
        assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
