//! # visor-service
//!
//! Visor GUI service binary — loads settings, wires the state dispatcher to
//! the WebSocket server, and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use visor_server::metrics;
use visor_server::registry::ConnectionRegistry;
use visor_server::server::VisorServer;
use visor_settings::{loader, VisorSettings};
use visor_state::{build_extension, Dispatcher};

/// Visor GUI state service.
#[derive(Parser, Debug)]
#[command(name = "visor", about = "GUI state synchronization service")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.visor/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Emit JSON log lines regardless of settings.
    #[arg(long)]
    json_logs: bool,
}

/// Fold CLI flags over the loaded settings; flags win.
fn apply_cli_overrides(settings: &mut VisorSettings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the settings
/// level when set.
fn init_logging(settings: &VisorSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings.clone().unwrap_or_else(loader::settings_path);
    let mut settings = loader::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    apply_cli_overrides(&mut settings, &args);

    init_logging(&settings);
    if visor_settings::init_settings(settings.clone()).is_err() {
        tracing::warn!("settings were already initialized");
    }

    let metrics_handle = metrics::install_recorder();

    let registry = Arc::new(ConnectionRegistry::new(settings.server.max_connections));
    let extension = build_extension(&settings.extension);
    tracing::info!(
        extension = extension.name(),
        homescreen = extension.homescreen_supported(),
        "extension loaded"
    );
    let dispatcher = Dispatcher::new(&settings, extension, registry.clone());

    let server = VisorServer::new(settings.clone(), dispatcher.clone(), registry, metrics_handle);

    // Idle ticker: consult the extension periodically so homescreen-capable
    // platforms return home after inactivity. Idempotent when the
    // homescreen is already up.
    let idle_dispatcher = dispatcher.clone();
    let idle_token = server.shutdown().token();
    let idle_secs = settings.extension.idle_timeout_secs.max(1);
    let idle_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(idle_secs));
        // Skip the immediate first tick
        let _ = tick.tick().await;
        loop {
            tokio::select! {
                () = idle_token.cancelled() => break,
                _ = tick.tick() => idle_dispatcher.handle_idle(),
            }
        }
    });

    let (addr, serve_task) = server.listen().await.context("failed to bind server")?;
    tracing::info!("visor listening on http://{addr} (renderer socket at ws://{addr}/gui)");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(server.registry(), vec![serve_task, idle_task], None)
        .await;
    tracing::info!("shutdown complete");
    Ok(())
}
