//! Client metrics
//!
//! Emits request, throttle, batching and session-lifecycle metrics through
//! the `metrics` facade. Without an installed recorder every call is a no-op;
//! [`init_metrics`] installs a Prometheus exporter for applications that
//! want a scrape endpoint.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Initialize metrics with a Prometheus scrape endpoint
///
/// Idempotent: later calls return `Ok(())` without reinstalling.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
///
/// # Errors
/// Returns `ClientError::Config` if the exporter cannot be installed
pub async fn init_metrics(addr: SocketAddr) -> ClientResult<()> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ClientError::Config(format!("failed to install Prometheus exporter: {e}")))?;

    describe_metrics();

    *initialized = true;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "telemetry_requests_total",
        Unit::Count,
        "HTTP requests sent to the telemetry API, by resource and outcome"
    );
    describe_histogram!(
        "telemetry_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "telemetry_throttle_wait_seconds",
        Unit::Seconds,
        "Time requests spent waiting on the rate limiter"
    );
    describe_histogram!(
        "telemetry_batches_per_retrieve",
        Unit::Count,
        "Leaf requests needed to serve one retrieve call"
    );
    describe_counter!(
        "telemetry_session_events_total",
        Unit::Count,
        "Session lifecycle events (open, close and their failures)"
    );
}

/// Record one HTTP request
pub fn record_request(resource: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "telemetry_requests_total",
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("telemetry_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record time spent throttled by the rate limiter
pub fn record_throttle_wait(wait: Duration) {
    histogram!("telemetry_throttle_wait_seconds").record(wait.as_secs_f64());
}

/// Record how many batches a retrieve call needed
pub fn record_batches(count: usize) {
    histogram!("telemetry_batches_per_retrieve").record(count as f64);
}

/// Record a session lifecycle event
pub fn record_session_event(event: &'static str) {
    counter!("telemetry_session_events_total", "event" => event).increment(1);
}
