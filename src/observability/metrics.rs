//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejected bodies, connections)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method and envelope code
//! - `gateway_request_duration_seconds` (histogram): latency distribution by method
//! - `gateway_body_rejections_total` (counter): body reads/decodes that failed, by code
//! - `gateway_connections_destroyed_total` (counter): connections torn down mid-request
//! - `gateway_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - The recorder is only installed when enabled; the macros are no-ops otherwise
//! - Labels stay low-cardinality: no paths, no peer addresses

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished request. `code` is `"ok"` or the envelope error code.
pub fn record_request(method: &str, code: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_body_rejected(code: &str) {
    counter!("gateway_body_rejections_total", "code" => code.to_string()).increment(1);
}

pub fn record_connection_destroyed() {
    counter!("gateway_connections_destroyed_total").increment(1);
}
