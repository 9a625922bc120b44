//! Metrics collection and exposition.
//!
//! # Metrics
//! - `broker_enqueued_total` (counter): messages stored, by queue
//! - `broker_dequeued_total` (counter): messages delivered and acknowledged, by queue
//! - `broker_dequeue_empty_total` (counter): dequeues that found nothing, by queue
//! - `broker_storage_errors_total` (counter): storage failures, by queue and operation
//! - `broker_requests_total` / `broker_request_duration_seconds`: by method and status
//! - `broker_active_connections` (gauge): in-flight connections

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize the Prometheus recorder and HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_enqueue(queue: &str) {
    counter!("broker_enqueued_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_dequeue(queue: &str) {
    counter!("broker_dequeued_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_empty(queue: &str) {
    counter!("broker_dequeue_empty_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_storage_error(queue: &str, operation: &'static str) {
    counter!(
        "broker_storage_errors_total",
        "queue" => queue.to_string(),
        "operation" => operation
    )
    .increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
    ];
    counter!("broker_requests_total", labels.clone()).increment(1);
    histogram!("broker_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}
