//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, auth)
//! - Look up media records and run the retrieval chain
//! - Serve on a plain or TLS listener until shutdown

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{FetchConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::fetch::{RedirectFetcher, RetrievalRequest, Retriever};
use crate::http::middleware::bearer_auth_middleware;
use crate::http::request::{request_id, MakeRequestUuid, MediaQuery, X_REQUEST_ID};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::records::{InMemoryRecordStore, RecordStore};
use crate::security::{AllowListPolicy, HostResolver, SystemResolver, UrlGuard};

/// Grace period for in-flight TLS connections after shutdown.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub retriever: Retriever,
    pub records: Arc<dyn RecordStore>,
    pub fetch_config: Arc<FetchConfig>,
    pub auth_token: Option<Arc<str>>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid allow-list: {}", .0.join(", "))]
    AllowList(Vec<String>),

    #[error("failed to build outbound HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP server for the media proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build a server using the system resolver and the configured records.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Build a server with a custom resolver (tests map names onto loopback).
    pub fn with_resolver(
        config: ProxyConfig,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, ServerError> {
        let records = Arc::new(InMemoryRecordStore::from_config(&config.records));
        Self::from_parts(config, resolver, records)
    }

    pub fn from_parts(
        config: ProxyConfig,
        resolver: Arc<dyn HostResolver>,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self, ServerError> {
        let allow_list = AllowListPolicy::from_patterns(config.allow_list.hosts.as_slice())
            .map_err(ServerError::AllowList)?;
        tracing::info!(patterns = allow_list.len(), "Allow-list compiled");

        let guard = UrlGuard::new(Arc::new(allow_list), resolver);
        let fetcher = RedirectFetcher::new(guard, &config.fetch)?;

        let state = AppState {
            retriever: Retriever::new(fetcher),
            records,
            fetch_config: Arc::new(config.fetch.clone()),
            auth_token: config.auth.bearer_token.as_deref().map(Arc::from),
        };

        let router = Self::build_router(state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let media = Router::new()
            .route("/media/{id}", get(media_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                bearer_auth_middleware,
            ));

        Router::new()
            .merge(media)
            .route("/healthz", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            path = req.uri().path(),
                            request_id = request_id(req),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone())),
            )
    }

    /// Serve on a plain TCP listener until `shutdown_rx` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown_rx` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown_rx).await;
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Router for in-process use (e.g. `tower::ServiceExt::oneshot`).
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// `GET /media/{id}`: look up the record and stream its upstream body.
async fn media_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let start = Instant::now();
    let query = MediaQuery::from_params(&params);

    match serve_media(&state, &id, query).await {
        Ok(response) => {
            metrics::record_request("ok", start);
            response
        }
        Err(e) => {
            match &e {
                ProxyError::Validation(_) | ProxyError::NotFound(_) => {
                    tracing::info!(record_id = %id, kind = e.kind(), reason = e.reason(), error = %e, "Media request rejected");
                }
                _ => {
                    tracing::warn!(record_id = %id, kind = e.kind(), reason = e.reason(), error = %e, "Media request failed");
                }
            }
            metrics::record_rejection(&e);
            metrics::record_request(e.kind(), start);
            e.into_response()
        }
    }
}

async fn serve_media(state: &AppState, id: &str, query: MediaQuery) -> Result<Response, ProxyError> {
    let record = state
        .records
        .lookup(id)
        .await
        .ok_or_else(|| ProxyError::NotFound(id.to_string()))?;

    let request = RetrievalRequest::new(
        record.url,
        query.disposition,
        query.max_bytes,
        &state.fetch_config,
    );
    let proxied = state.retriever.retrieve(&request, &record.filename).await?;
    Ok(proxied.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordConfig;
    use crate::security::StaticResolver;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(config: ProxyConfig) -> HttpServer {
        HttpServer::with_resolver(config, Arc::new(StaticResolver::new())).unwrap()
    }

    async fn send_get(router: Router, uri: &str, auth: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = auth {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn health_and_request_id() {
        let response = send_get(server(ProxyConfig::default()).router(), "/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let response = send_get(server(ProxyConfig::default()).router(), "/media/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn loopback_record_rejected_before_any_fetch() {
        let mut config = ProxyConfig::default();
        config.records.push(RecordConfig {
            id: "local".into(),
            url: "http://127.0.0.1:8080/x".into(),
            filename: String::new(),
        });
        let response = send_get(server(config).router(), "/media/local", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bearer_token_enforced_on_media_only() {
        let mut config = ProxyConfig::default();
        config.auth.bearer_token = Some("s3cret".into());
        let router = server(config).router();

        assert_eq!(send_get(router.clone(), "/media/x", None).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(send_get(router.clone(), "/media/x", Some("wrong")).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(send_get(router.clone(), "/media/x", Some("s3cret")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(send_get(router, "/healthz", None).await.status(), StatusCode::OK);
    }

    #[test]
    fn bad_allow_list_fails_construction() {
        let mut config = ProxyConfig::default();
        config.allow_list.hosts = vec!["https://cdn.example/".into()];
        let result = HttpServer::with_resolver(config, Arc::new(StaticResolver::new()));
        assert!(matches!(result, Err(ServerError::AllowList(_))));
    }
}
