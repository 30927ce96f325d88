//! # hive-hub
//!
//! Telemetry hub binary: loads settings, starts logging and metrics, and
//! serves ingestion plus live broadcast until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hive_broadcast::{HubConfig, TelemetryHub};
use hive_logging::LogLevel;
use hive_server::{HiveServer, ServerConfig};
use hive_settings::HiveSettings;

/// Upper bound on in-flight requests plus session drain after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Telemetry ingestion and broadcast hub.
#[derive(Parser, Debug)]
#[command(name = "hive-hub", about = "Telemetry ingestion and broadcast hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.hive/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(hive_settings::settings_path)
    }

    /// Flags win over file and environment.
    fn apply(&self, settings: &mut HiveSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = LogLevel::from_str_lossy(level);
        }
    }
}

fn load(cli: &Cli) -> Result<HiveSettings> {
    let path = cli.settings_path();
    let mut settings = hive_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    hive_logging::init_subscriber(settings.logging.level, settings.logging.format);
    let metrics = hive_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let hub = Arc::new(TelemetryHub::new(HubConfig::from(&settings.hub)));
    let server = HiveServer::new(ServerConfig::from(&settings.server), hub, metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        max_subscribers = settings.hub.max_subscribers,
        required_fields = ?settings.hub.required_fields,
        "hive hub listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(joined) => joined.context("Server task failed")?,
        Err(_) => tracing::warn!("server still stopping after {SHUTDOWN_TIMEOUT:?}, exiting"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
