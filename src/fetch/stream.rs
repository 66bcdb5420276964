//! Size-bounded, rewindable upstream body.
//!
//! # Phases
//! ```text
//! prime():   pull chunks until SNIFF_LEN bytes are retained (or EOF)
//! phase 1:   replay retained chunks in original order
//! phase 2:   pass upstream chunks straight through
//! ```
//!
//! Every byte pulled from upstream counts against `max_bytes`, in both
//! phases. The chunk that would cross the limit is never emitted; the
//! upstream is dropped (cancelling the transfer) and the stream yields
//! `ProxyError::TooLarge`.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::ProxyError;
use crate::media::sniff::SNIFF_LEN;
use crate::observability::metrics;

/// Boxed upstream byte stream with errors already classified.
pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

pub struct BoundedStream {
    upstream: Option<UpstreamBody>,
    retained: VecDeque<Bytes>,
    head: Vec<u8>,
    max_bytes: u64,
    transferred: u64,
}

impl BoundedStream {
    pub fn new(upstream: UpstreamBody, max_bytes: u64) -> Self {
        Self {
            upstream: Some(upstream),
            retained: VecDeque::new(),
            head: Vec::with_capacity(SNIFF_LEN),
            max_bytes,
            transferred: 0,
        }
    }

    /// Pull enough of the body to fill the head buffer.
    ///
    /// Pulled chunks are retained and replayed to the consumer; nothing is
    /// lost. Size and transport failures surface here, before any response
    /// header is written.
    pub async fn prime(&mut self) -> Result<(), ProxyError> {
        while self.head.len() < SNIFF_LEN {
            let Some(upstream) = self.upstream.as_mut() else {
                break;
            };
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    self.account(chunk.len())?;
                    let want = SNIFF_LEN - self.head.len();
                    self.head.extend_from_slice(&chunk[..want.min(chunk.len())]);
                    self.retained.push_back(chunk);
                }
                Some(Err(e)) => {
                    self.cancel();
                    return Err(e);
                }
                None => self.upstream = None,
            }
        }
        Ok(())
    }

    /// First bytes of the body (up to `SNIFF_LEN`).
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Bytes pulled from upstream so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    fn account(&mut self, len: usize) -> Result<(), ProxyError> {
        let total = self.transferred.saturating_add(len as u64);
        if total > self.max_bytes {
            tracing::warn!(
                limit = self.max_bytes,
                transferred = self.transferred,
                "Upstream body exceeded size limit, aborting transfer"
            );
            self.cancel();
            return Err(ProxyError::TooLarge {
                limit: self.max_bytes,
                declared: None,
            });
        }
        self.transferred = total;
        Ok(())
    }

    /// Drop the upstream, closing its connection.
    fn cancel(&mut self) {
        self.upstream = None;
        self.retained.clear();
    }
}

impl std::fmt::Debug for BoundedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedStream")
            .field("max_bytes", &self.max_bytes)
            .field("transferred", &self.transferred)
            .field("retained", &self.retained.len())
            .finish_non_exhaustive()
    }
}

impl Stream for BoundedStream {
    type Item = Result<Bytes, ProxyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.retained.pop_front() {
            metrics::record_bytes_streamed(chunk.len());
            return Poll::Ready(Some(Ok(chunk)));
        }

        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        match upstream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => match this.account(chunk.len()) {
                Ok(()) => {
                    metrics::record_bytes_streamed(chunk.len());
                    Poll::Ready(Some(Ok(chunk)))
                }
                Err(e) => Poll::Ready(Some(Err(e))),
            },
            Poll::Ready(Some(Err(e))) => {
                this.cancel();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.upstream = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use futures_util::stream;

    type Chunk = Result<&'static [u8], ProxyError>;

    fn ok(bytes: &'static [u8]) -> Chunk {
        Ok(bytes)
    }

    fn upstream(chunks: Vec<Chunk>) -> UpstreamBody {
        stream::iter(chunks.into_iter().map(|c| c.map(Bytes::from_static))).boxed()
    }

    async fn drain(stream: &mut BoundedStream) -> (Vec<u8>, Option<ProxyError>) {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn head_is_a_copy_not_a_consumption_point() {
        let chunks = vec![
            ok(&[0xFF, 0xD8]),
            ok(&[0xFF, 0xE0, 1, 2, 3]),
            ok(&[0u8; 40]),
            ok(b"tail"),
        ];
        let mut body = BoundedStream::new(upstream(chunks), 1024);
        body.prime().await.unwrap();

        assert_eq!(body.head().len(), SNIFF_LEN);
        assert_eq!(&body.head()[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);

        let (bytes, err) = drain(&mut body).await;
        assert!(err.is_none());
        let mut expected = vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        expected.extend_from_slice(&[0u8; 40]);
        expected.extend_from_slice(b"tail");
        assert_eq!(bytes, expected);
        assert_eq!(body.transferred(), expected.len() as u64);
    }

    #[tokio::test]
    async fn short_body_primes_to_eof() {
        let mut body = BoundedStream::new(upstream(vec![ok(b"GIF89a")]), 1024);
        body.prime().await.unwrap();
        assert_eq!(body.head(), b"GIF89a");

        let (bytes, err) = drain(&mut body).await;
        assert!(err.is_none());
        assert_eq!(bytes, b"GIF89a");
    }

    #[tokio::test]
    async fn empty_body() {
        let mut body = BoundedStream::new(upstream(vec![]), 1024);
        body.prime().await.unwrap();
        assert!(body.head().is_empty());
        assert_eq!(drain(&mut body).await.0, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn limit_enforced_while_priming() {
        let mut body = BoundedStream::new(upstream(vec![ok(&[1u8; 20]), ok(&[2u8; 20])]), 30);
        let err = body.prime().await.unwrap_err();
        assert!(matches!(err, ProxyError::TooLarge { limit: 30, .. }));
        assert!(drain(&mut body).await.0.is_empty());
    }

    #[tokio::test]
    async fn limit_enforced_after_head() {
        let chunks = vec![ok(&[0u8; 32]), ok(&[0u8; 32]), ok(&[0u8; 32]), ok(&[0u8; 32])];
        let mut body = BoundedStream::new(upstream(chunks), 80);
        body.prime().await.unwrap();

        let (bytes, err) = drain(&mut body).await;
        assert_eq!(bytes.len(), 64);
        assert!(matches!(err, Some(ProxyError::TooLarge { limit: 80, .. })));
        assert!(body.next().await.is_none(), "stream must stay terminated");
    }

    #[tokio::test]
    async fn exact_limit_is_allowed() {
        let mut body = BoundedStream::new(upstream(vec![ok(&[7u8; 50]), ok(&[7u8; 14])]), 64);
        body.prime().await.unwrap();
        let (bytes, err) = drain(&mut body).await;
        assert!(err.is_none());
        assert_eq!(bytes.len(), 64);
    }

    #[tokio::test]
    async fn transport_error_mid_stream() {
        let chunks = vec![
            ok(&[0u8; 40]),
            Err(UpstreamError::Transport("connection reset".into()).into()),
            ok(b"never"),
        ];
        let mut body = BoundedStream::new(upstream(chunks), 1024);
        body.prime().await.unwrap();

        let (bytes, err) = drain(&mut body).await;
        assert_eq!(bytes.len(), 40);
        assert!(matches!(err, Some(ProxyError::Upstream(UpstreamError::Transport(_)))));
        assert!(body.next().await.is_none());
    }
}
