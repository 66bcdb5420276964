//! Guarded redirect fetcher.
//!
//! # States
//! ```text
//! Validating ──ok──▶ Requesting ──2xx──▶ Done
//!     ▲                  │
//!     │                  ├──3xx + Location──▶ Redirecting ──▶ Validating
//!     │                  │
//!     └── (hop + 1)      └──anything else──▶ Failed
//! ```
//!
//! # Design Decisions
//! - Automatic redirects are disabled in the HTTP client; every hop is
//!   re-validated here, including a fresh resolution
//! - One client is built at startup and shared by every request, so TLS
//!   roots load once and idle connections are reused
//! - The client resolves through the guard, so the lookup made when a
//!   connection opens is checked like the one made during validation
//! - One deadline covers resolution, every hop and the body transfer

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::LOCATION;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use tokio::time::Instant;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{ProxyError, UpstreamError};
use crate::fetch::stream::BoundedStream;
use crate::observability::metrics;
use crate::security::{UrlGuard, ValidatedTarget};

/// Successful upstream response, body not yet read.
pub struct Fetched {
    pub final_url: Url,
    /// Redirects followed before the final response.
    pub redirects: u32,
    pub content_type: Option<String>,
    /// Declared length, already checked against the cap.
    pub content_length: Option<u64>,
    pub body: BoundedStream,
}

impl std::fmt::Debug for Fetched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetched")
            .field("final_url", &self.final_url.as_str())
            .field("redirects", &self.redirects)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RedirectFetcher {
    guard: UrlGuard,
    client: reqwest::Client,
    hop_limit: u32,
    timeout: Duration,
}

impl RedirectFetcher {
    /// Build the shared outbound client. Fails only if the TLS backend
    /// cannot be initialized.
    pub fn new(guard: UrlGuard, config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .dns_resolver(Arc::new(guard.clone()))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            guard,
            client,
            hop_limit: config.hop_limit,
            timeout: config.timeout(),
        })
    }

    /// Fetch `target`, following at most `hop_limit` validated redirects.
    pub async fn fetch(&self, target: &Url, max_bytes: u64) -> Result<Fetched, ProxyError> {
        let deadline = Instant::now() + self.timeout;
        match tokio::time::timeout_at(deadline, self.follow(target, max_bytes, deadline)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    host = target.host_str().unwrap_or_default(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Upstream fetch deadline exceeded"
                );
                Err(UpstreamError::Timeout.into())
            }
        }
    }

    async fn follow(
        &self,
        target: &Url,
        max_bytes: u64,
        deadline: Instant,
    ) -> Result<Fetched, ProxyError> {
        let mut current = target.clone();
        let mut hop: u32 = 0;

        loop {
            let validated = match self.guard.validate(&current).await {
                Ok(v) => v,
                Err(ProxyError::Validation(cause)) if hop > 0 => {
                    tracing::warn!(hop, reason = cause.reason(), "Redirect target rejected");
                    return Err(UpstreamError::RedirectRejected { hop, source: cause }.into());
                }
                Err(e) => return Err(e),
            };

            let response = self.send(&validated, deadline).await?;
            let status = response.status();

            tracing::debug!(
                hop,
                host = %validated.host,
                addrs = validated.addrs.len(),
                path = current.path(),
                status = status.as_u16(),
                "Upstream responded"
            );

            if status.is_redirection() {
                if hop >= self.hop_limit {
                    return Err(UpstreamError::TooManyRedirects(self.hop_limit).into());
                }
                let next = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location.trim()).ok())
                    .ok_or(UpstreamError::MissingLocation(status.as_u16()))?;
                drop(response);

                hop += 1;
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(UpstreamError::Status(status.as_u16()).into());
            }

            let declared = response.content_length();
            if let Some(len) = declared {
                if len > max_bytes {
                    tracing::warn!(declared = len, limit = max_bytes, "Declared length over limit");
                    return Err(ProxyError::TooLarge {
                        limit: max_bytes,
                        declared: Some(len),
                    });
                }
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let upstream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(classify_transport))
                .boxed();

            return Ok(Fetched {
                final_url: current,
                redirects: hop,
                content_type,
                content_length: declared,
                body: BoundedStream::new(upstream, max_bytes),
            });
        }
    }

    /// One outbound `GET`. The request timeout is whatever remains of the
    /// deadline and also bounds the body read.
    async fn send(
        &self,
        target: &ValidatedTarget,
        deadline: Instant,
    ) -> Result<reqwest::Response, ProxyError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(UpstreamError::Timeout.into());
        }

        metrics::record_upstream_request();
        self.client
            .get(target.url.clone())
            .timeout(remaining)
            .send()
            .await
            .map_err(classify_transport)
    }
}

/// Map a client error onto the upstream taxonomy, dropping the URL so query
/// strings never reach logs or responses.
fn classify_transport(err: reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        UpstreamError::Timeout.into()
    } else {
        UpstreamError::Transport(err.without_url().to_string()).into()
    }
}
