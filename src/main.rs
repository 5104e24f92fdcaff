//! Attendance agent - headless worker attendance and job-progress controller
//!
//! Watches the worker's position against the workshop geofence, reports
//! presence, and forwards check-in, order progress and notification actions
//! to the worker API.
//!
//! Module structure:
//! - `domain/` - Core types (geofence math, samples, attendance, progress)
//! - `io/` - External interfaces (worker API, location providers, status HTTP)
//! - `services/` - Geofence monitor and the worker session loop
//! - `infra/` - Infrastructure (Config, Metrics)
//!
//! Worker actions are read one per line from stdin, see `UserAction`.

use anyhow::Context;
use attendance_agent::infra::{Config, Metrics};
use attendance_agent::io::location::{FixCache, LocationWatch};
use attendance_agent::io::{HttpWorkerApi, LogPresenter, SharedPresence};
use attendance_agent::services::{UserAction, WorkerSession};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Attendance agent - geofenced presence and job progress for workshop staff
#[derive(Parser, Debug)]
#[command(name = "attendance-agent", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Do not read worker commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for every position update
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Forward parsed stdin lines to the session; EOF requests shutdown
async fn read_commands(actions: mpsc::Sender<UserAction>, shutdown: watch::Sender<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<UserAction>() {
                Ok(action) => {
                    if actions.send(action).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(input = %line.trim(), error = %e, "invalid_command"),
            },
            Ok(None) => {
                info!("stdin_closed");
                let _ = shutdown.send(true);
                return;
            }
            Err(e) => {
                warn!(error = %e, "stdin_read_failed");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "attendance_agent_starting");

    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    let geofence = config.geofence();
    info!(
        config_file = %config.config_file(),
        server = %config.server_base_url(),
        latitude = %geofence.center.latitude,
        longitude = %geofence.center.longitude,
        radius_m = %geofence.radius_m,
        location_provider = %config.location_provider().as_str(),
        auto_check_in = config.auto_check_in(),
        metrics_port = %config.metrics_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let presence = SharedPresence::new();

    // Start status HTTP server (if port > 0)
    let metrics_port = config.metrics_port();
    if metrics_port > 0 {
        let status_metrics = metrics.clone();
        let status_presence = presence.clone();
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = attendance_agent::io::status::start_status_server(
                metrics_port,
                status_metrics,
                status_presence,
                status_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "status_server_error");
            }
        });
    }

    let api = HttpWorkerApi::new(config.server_base_url()).context("Failed to build API client")?;
    let watch = LocationWatch::from_config(&config, FixCache::new());

    let (action_tx, action_rx) = mpsc::channel(32);
    if args.no_stdin {
        drop(action_tx);
    } else {
        let stdin_shutdown = shutdown_tx.clone();
        tokio::spawn(read_commands(action_tx, stdin_shutdown));
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let mut session = WorkerSession::new(&config, api, LogPresenter::new(presence), metrics);
    session.run(watch, action_rx, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    info!("attendance-agent shutdown complete");
    Ok(())
}
