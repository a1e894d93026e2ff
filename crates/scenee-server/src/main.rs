//! # scenee-server
//!
//! Real-time delivery server binary: loads settings, installs logging and
//! metrics, and serves `/events` until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scenee_core::logging::{LogFormat, init_subscriber};
use scenee_server::identity::HeaderIdentity;
use scenee_server::metrics::install_recorder;
use scenee_server::server::SceneeServer;
use scenee_settings::{SceneeSettings, load_settings, load_settings_from_path};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// scenee real-time delivery server.
#[derive(Parser, Debug)]
#[command(name = "scenee-server", about = "scenee real-time delivery server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.scenee/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Header carrying the authenticated user id.
    #[arg(long, default_value = scenee_server::identity::DEFAULT_USER_HEADER)]
    user_header: String,
}

fn resolve_settings(cli: &Cli) -> Result<SceneeSettings> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(%error, "metrics recorder unavailable, /metrics will be empty");
            None
        }
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        queue_capacity = settings.realtime.queue_capacity,
        heartbeat_secs = settings.realtime.heartbeat_interval_secs,
        "starting scenee server"
    );
    let server = SceneeServer::new(settings, Arc::new(HeaderIdentity::new(cli.user_header)), metrics);

    let shutdown = Arc::clone(server.shutdown());
    let _ = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, shutting down");
                shutdown.shutdown();
            }
            Err(error) => warn!(%error, "failed to listen for ctrl-c"),
        }
    });

    server.serve(listener).await?;
    Ok(())
}
