// Replay binary entry point
//
// Usage: replay <scheduler-name> <trace.json> [config-dir]
//
// Loads the named scheduler from layered configuration, replays the recorded
// call trace on virtual time and prints the invocations as JSON on stdout.

mod trace;

use anyhow::{bail, Context, Result};
use pacer::config::Settings;
use pacer::telemetry;
use std::path::PathBuf;
use tracing::{error, info};
use trace::Trace;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(scheduler_name), Some(trace_path)) = (args.next(), args.next()) else {
        bail!("usage: replay <scheduler-name> <trace.json> [config-dir]");
    };
    let config_dir = args.next().map(PathBuf::from).unwrap_or_else(|| "config".into());

    // Load configuration
    let settings = Settings::load_from_path(&config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;

    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid configuration");
        bail!("Invalid configuration: {}", e);
    }

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let scheduler_settings = settings
        .scheduler(&scheduler_name)
        .with_context(|| format!("No scheduler named '{}' in configuration", scheduler_name))?;

    info!(
        scheduler = %scheduler_name,
        trace = %trace_path,
        "Starting trace replay"
    );

    let raw = std::fs::read_to_string(&trace_path)
        .with_context(|| format!("Failed to read trace file {}", trace_path))?;
    let trace: Trace = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse trace file {}", trace_path))?;

    let report = trace::replay(&scheduler_name, scheduler_settings, &trace)?;

    info!(
        scheduler = %scheduler_name,
        calls = report.calls,
        invocations = report.invocations.len(),
        "Trace replayed"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
