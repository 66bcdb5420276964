//! Metrics collection and exposition.
//!
//! # Metrics
//! - `media_proxy_requests_total` (counter): requests by outcome
//! - `media_proxy_request_duration_seconds` (histogram): latency by outcome
//! - `media_proxy_upstream_requests_total` (counter): outbound requests, one
//!   per hop
//! - `media_proxy_bytes_streamed_total` (counter): body bytes relayed
//! - `media_proxy_rejections_total` (counter): failures by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Labels are small closed sets (outcome, reason), never hosts or ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ProxyError;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

fn describe_metrics() {
    metrics::describe_counter!("media_proxy_requests_total", "Media requests by outcome");
    metrics::describe_histogram!(
        "media_proxy_request_duration_seconds",
        metrics::Unit::Seconds,
        "Time until response headers were ready"
    );
    metrics::describe_counter!(
        "media_proxy_upstream_requests_total",
        "Outbound requests, including redirect hops"
    );
    metrics::describe_counter!(
        "media_proxy_bytes_streamed_total",
        metrics::Unit::Bytes,
        "Body bytes relayed to callers"
    );
    metrics::describe_counter!("media_proxy_rejections_total", "Failed requests by reason");
}

/// Record a finished request. `outcome` is `ok` or an error kind.
pub fn record_request(outcome: &'static str, start: Instant) {
    metrics::counter!("media_proxy_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("media_proxy_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(error: &ProxyError) {
    metrics::counter!("media_proxy_rejections_total", "reason" => error.reason()).increment(1);
}

pub fn record_upstream_request() {
    metrics::counter!("media_proxy_upstream_requests_total").increment(1);
}

pub fn record_bytes_streamed(bytes: usize) {
    metrics::counter!("media_proxy_bytes_streamed_total").increment(bytes as u64);
}
