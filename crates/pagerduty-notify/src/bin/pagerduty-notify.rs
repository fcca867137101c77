//! pagerduty-notify service binary.
//!
//! Receives GoCD stage-status notifications over HTTP and opens/resolves
//! PagerDuty incidents for monitored pipelines.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pagerduty_notify::{host, server, Config, IncidentReconciler, PagerDutyChannel};

/// Forward GoCD stage failures to PagerDuty.
#[derive(Parser)]
#[command(name = "pagerduty-notify")]
#[command(about = "Open and resolve PagerDuty incidents from GoCD stage-status notifications")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "PAGERDUTY_NOTIFY_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "PAGERDUTY_NOTIFY_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("pagerduty_notify=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pagerduty_notify=info,warn"))
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("Starting pagerduty-notify...");

    let config = Config::from_env().context("Invalid PagerDuty configuration")?;
    let hostname = host::discover_hostname();
    info!(hostname = %hostname, server_url = ?config.server_url, "Resolved GoCD link base");

    let channel = PagerDutyChannel::new(config.events_url.clone(), config.timeout)
        .context("Failed to create PagerDuty client")?;

    let reconciler = IncidentReconciler::new(config.monitor, hostname, Arc::new(channel))
        .with_server_url(config.server_url);

    server::run_server(Arc::new(reconciler), &cli.addr).await
}
