//! Metrics collection and exposition.
//!
//! # Metrics
//! - `routekit_requests_total` (counter): requests by method, status, pattern
//! - `routekit_request_duration_seconds` (histogram): latency distribution
//! - `routekit_builds_total` (counter): dev-mode build transitions by event
//! - `routekit_artifact_loads_total` (counter): protected loads by resource, outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is opt-in via config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, pattern: &str, started: Instant) {
    counter!(
        "routekit_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "pattern" => pattern.to_string()
    )
    .increment(1);
    histogram!("routekit_request_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_build_event(event: &'static str) {
    counter!("routekit_builds_total", "event" => event).increment(1);
}

pub fn record_artifact_load(resource: &'static str, outcome: &'static str) {
    counter!(
        "routekit_artifact_loads_total",
        "resource" => resource,
        "outcome" => outcome
    )
    .increment(1);
}
