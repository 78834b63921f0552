//! `relaygate` daemon: resolves upstream settings, runs the operation tracker
//! until interrupted, then drains it.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relaygate_core::UpstreamSettings;
use relaygate_server::telemetry::{init_tracing, LogFormat};
use relaygate_server::{OperationTracker, TrackerConfig};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "relaygate", version, about = "Tracks and sweeps in-flight upstream operations")]
struct Cli {
    /// Seconds between sweeps that drop finished operations.
    #[arg(long, env = "RELAYGATE_COMPLETED_SWEEP_SECS", default_value_t = 10)]
    completed_sweep_secs: u64,

    /// Seconds between sweeps that cancel over-age operations.
    #[arg(long, env = "RELAYGATE_STALE_SWEEP_SECS", default_value_t = 60)]
    stale_sweep_secs: u64,

    /// Running operations older than this many seconds are asked to cancel.
    #[arg(long, env = "RELAYGATE_MAX_OPERATION_AGE_SECS", default_value_t = 300)]
    max_operation_age_secs: u64,

    /// Ask still-running operations to cancel on shutdown.
    #[arg(
        long,
        env = "RELAYGATE_CANCEL_ON_SHUTDOWN",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    cancel_on_shutdown: bool,

    /// Upstream base URL override.
    #[arg(long, env = "CUSTOM_ENDPOINT")]
    custom_endpoint: Option<String>,

    /// Extra upstream headers, `name=value;name=value`.
    #[arg(long, env = "CUSTOM_HEADERS")]
    custom_headers: Option<String>,

    /// Log output: `text` or `json`.
    #[arg(long, env = "RELAYGATE_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            completed_sweep_interval: Duration::from_secs(self.completed_sweep_secs),
            stale_sweep_interval: Duration::from_secs(self.stale_sweep_secs),
            max_operation_age: Duration::from_secs(self.max_operation_age_secs),
            cancel_on_shutdown: self.cancel_on_shutdown,
            ..TrackerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let upstream =
        UpstreamSettings::resolve(cli.custom_endpoint.as_deref(), cli.custom_headers.as_deref());
    info!(header_count = upstream.headers.len(), "upstream settings resolved");

    let tracker = OperationTracker::new(cli.tracker_config());
    tracker.start().context("starting operation tracker")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let drained = tracker.shutdown().await;
    info!(drained, "relaygate stopped");
    Ok(())
}
