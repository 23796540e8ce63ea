// Telemetry module for structured logging and metrics

use crate::scheduler::Edge;
use anyhow::Result;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// This function sets up the tracing subscriber with:
/// - JSON formatting (or human-readable output when `json` is false)
/// - Log levels from `RUST_LOG`, falling back to `log_level`
/// - Target, file and line information in every entry
/// - Output on stderr, leaving stdout to the caller
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let layer = if json {
        fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");

    Ok(())
}

/// Initialize Prometheus metrics exporter
///
/// Registers descriptions for:
/// - pacer_calls_total: Counter of call requests per scheduler
/// - pacer_invocations_total: Counter of target invocations per scheduler and edge
/// - pacer_cancellations_total: Counter of cancel operations
/// - pacer_trailing_failures_total: Counter of failed timer-driven invocations
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Describe all scheduler metrics on the installed recorder
pub fn describe_metrics() {
    describe_counter!("pacer_calls_total", "Total number of call requests");
    describe_counter!(
        "pacer_invocations_total",
        "Total number of target invocations by edge"
    );
    describe_counter!("pacer_cancellations_total", "Total number of cancellations");
    describe_counter!(
        "pacer_trailing_failures_total",
        "Total number of failed timer-driven invocations"
    );
}

#[inline]
pub fn record_call(scheduler: &str) {
    counter!("pacer_calls_total", "scheduler" => scheduler.to_string()).increment(1);
}

#[inline]
pub fn record_invocation(scheduler: &str, edge: Edge) {
    counter!(
        "pacer_invocations_total",
        "scheduler" => scheduler.to_string(),
        "edge" => edge.as_str()
    )
    .increment(1);
}

#[inline]
pub fn record_cancellation(scheduler: &str) {
    counter!("pacer_cancellations_total", "scheduler" => scheduler.to_string()).increment(1);
}

#[inline]
pub fn record_trailing_failure(scheduler: &str) {
    counter!("pacer_trailing_failures_total", "scheduler" => scheduler.to_string()).increment(1);
}
