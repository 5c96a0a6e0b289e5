//! Prometheus metrics for the dashboard server
//!
//! Catalog and icon-tier counters are recorded by `trala-resolver`; this
//! module covers aggregation and upstream traffic.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_ERROR: &str = "error";

pub fn record_upstream_request(endpoint: &str, outcome: &str) {
    counter!("trala_upstream_requests_total", "endpoint" => endpoint.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_aggregation(routers: usize, services: usize, duration: Duration) {
    histogram!("trala_aggregation_duration_seconds").record(duration.as_secs_f64());
    gauge!("trala_routers_seen").set(routers as f64);
    gauge!("trala_services_discovered").set(services as f64);
}

pub fn record_manual_services(valid: usize, dropped: usize) {
    gauge!("trala_manual_services").set(valid as f64);
    if dropped > 0 {
        counter!("trala_manual_services_dropped_total").increment(dropped as u64);
    }
}

pub fn init_prometheus_recorder() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    Ok(builder.install_recorder()?)
}
