//! Upstream retrieval subsystem.
//!
//! # Data Flow
//! ```text
//! RetrievalRequest (target URL, disposition, clamped max_bytes)
//!     → redirect.rs (validate, request, follow validated redirects)
//!     → stream.rs (bounded body, head retained for sniffing)
//!     → media::sniff + media::disposition
//!     → ProxiedResponse (headers fixed, body still streaming)
//! ```
//!
//! # Design Decisions
//! - No retries anywhere in this path
//! - The response headers are decided only after the head is primed, so
//!   early size or transport failures still produce a clean error response

pub mod redirect;
pub mod stream;

use url::Url;

use crate::config::FetchConfig;
use crate::error::ProxyError;
use crate::media::{resolve_content_type, Disposition, HeaderPlan};
use crate::security::url_guard::parse_target;

pub use redirect::{Fetched, RedirectFetcher};
pub use stream::BoundedStream;

/// One caller request for upstream media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub target_url: String,
    pub disposition: Disposition,
    /// Already clamped to the configured range.
    pub max_bytes: u64,
}

impl RetrievalRequest {
    pub fn new(
        target_url: impl Into<String>,
        disposition: Disposition,
        requested_max: Option<u64>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            disposition,
            max_bytes: config.clamp_max_bytes(requested_max),
        }
    }
}

/// Headers plus the still-open body.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub headers: HeaderPlan,
    pub body: BoundedStream,
}

/// Runs the whole retrieval chain for one request.
#[derive(Debug, Clone)]
pub struct Retriever {
    fetcher: RedirectFetcher,
}

impl Retriever {
    pub fn new(fetcher: RedirectFetcher) -> Self {
        Self { fetcher }
    }

    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        display_name: &str,
    ) -> Result<ProxiedResponse, ProxyError> {
        let target: Url = parse_target(&request.target_url)?;
        let Fetched {
            final_url,
            redirects,
            content_type,
            content_length,
            mut body,
        } = self.fetcher.fetch(&target, request.max_bytes).await?;

        body.prime().await?;

        let resolved = resolve_content_type(content_type.as_deref(), body.head());
        let headers = HeaderPlan::new(
            &resolved,
            request.disposition,
            display_name,
            &final_url,
            content_length,
        );

        tracing::info!(
            host = final_url.host_str().unwrap_or_default(),
            path = final_url.path(),
            redirects,
            content_type = %headers.content_type,
            disposition = headers.disposition.as_str(),
            "Upstream media ready"
        );

        Ok(ProxiedResponse { headers, body })
    }
}
