//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): gate outcomes by `outcome`
//! - `gate_evaluation_seconds` (histogram): time spent in the gate
//! - `gate_rate_limited_total` (counter): rejections by policy `class`
//! - `gate_upload_rejections_total` (counter): violations by `reason`
//! - `gate_credentials_total` (counter): credential events by `event`
//! - `gate_account_events_total` (counter): registrations and logins by `event`
//! - `gate_usage_windows` (gauge): tracked usage windows
//!
//! Without an installed recorder every call is a no-op, which is what unit
//! tests rely on.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_gate_outcome(outcome: &'static str, start: Instant) {
    counter!("gate_requests_total", "outcome" => outcome).increment(1);
    histogram!("gate_evaluation_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &'static str) {
    counter!("gate_rate_limited_total", "class" => class).increment(1);
}

pub fn record_upload_rejection(reason: &'static str) {
    counter!("gate_upload_rejections_total", "reason" => reason).increment(1);
}

pub fn record_credential_event(event: &'static str) {
    counter!("gate_credentials_total", "event" => event).increment(1);
}

pub fn record_account_event(event: &'static str) {
    counter!("gate_account_events_total", "event" => event).increment(1);
}

pub fn record_usage_windows(count: usize) {
    gauge!("gate_usage_windows").set(count as f64);
}
