//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, status, backend
//! - `lb_request_duration_seconds` (histogram): time to response head
//! - `lb_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `lb_forwarded_bytes_total` (counter): body bytes relayed per backend
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::backend::Backend;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one handled request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let status = status.to_string();
    counter!(
        "lb_requests_total",
        "method" => method.to_string(),
        "status" => status.clone(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!(
        "lb_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status,
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of a health probe.
pub fn record_backend_health(backend: &Backend, healthy: bool) {
    gauge!("lb_backend_health", "backend" => backend.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

/// Record body bytes relayed from a backend.
pub fn record_forwarded_bytes(backend: &Backend, bytes: u64) {
    counter!("lb_forwarded_bytes_total", "backend" => backend.to_string()).increment(bytes);
}
