//! # mnemod
//!
//! Memory coordination server binary — loads settings, wires the
//! subsystems, and serves until interrupted.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mnemo_core::MemoryGateway;
use mnemo_server::{AppState, gateway_from_settings, serve};
use mnemo_settings::Settings;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Memory coordination server.
#[derive(Parser, Debug)]
#[command(name = "mnemod", about = "Memory coordination server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.mnemo/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => mnemo_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => mnemo_settings::load_settings().context("failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                settings.server.host, settings.server.port
            )
        })?;

    let gateway = gateway_from_settings(&settings.gateway).context("failed to build gateway")?;
    let state = AppState::new(settings, gateway).context("failed to build application state")?;
    let gateway = state.gateway.clone();

    let shutdown = CancellationToken::new();
    let (bound, handle) = serve(state, addr, shutdown.clone())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %bound, "mnemod ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    shutdown.cancel();
    let _ = handle.await;
    if let Err(e) = gateway.cleanup().await {
        tracing::warn!(error = %e, "gateway cleanup failed");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["mnemod"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        let settings = load_settings(&Cli {
            host: None,
            port: None,
            settings: Some(PathBuf::from("/nonexistent/settings.json")),
        })
        .unwrap();
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn cli_overrides_host_and_port() {
        let cli = Cli::parse_from(["mnemod", "--host", "127.0.0.1", "--port", "0"]);
        let settings = load_settings(&Cli {
            settings: Some(PathBuf::from("/nonexistent/settings.json")),
            ..cli
        })
        .unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
    }
}
