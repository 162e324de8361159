//! Metrics collection and exposition.
//!
//! # Metrics
//! - `woodland_requests_total` (counter): responses by method, status
//! - `woodland_request_duration_seconds` (histogram): latency by method
//! - `woodland_route_cache_misses_total` (counter): route cache misses

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished response.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "woodland_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!("woodland_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a route resolution that missed the cache.
pub fn record_route_cache_miss() {
    counter!("woodland_route_cache_misses_total").increment(1);
}
