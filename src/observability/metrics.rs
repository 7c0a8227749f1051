//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, upstream connections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): total requests by mode, status
//! - `proxy_request_duration_seconds` (histogram): time to response head by mode
//! - `proxy_upstream_connections_in_use` (gauge): leased upstream connections
//! - `proxy_upstream_connections_idle` (gauge): parked upstream connections
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for mode and status only; the upstream is fixed

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::upstream::PoolStatus;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one completed request.
pub fn record_request(mode: &'static str, status: u16, start: Instant) {
    metrics::counter!("proxy_requests_total", "mode" => mode, "status" => status.to_string()).increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "mode" => mode).record(start.elapsed().as_secs_f64());
}

/// Publish upstream pool occupancy.
pub fn record_pool(status: &PoolStatus) {
    metrics::gauge!("proxy_upstream_connections_in_use").set(status.in_use as f64);
    metrics::gauge!("proxy_upstream_connections_idle").set(status.idle as f64);
}
