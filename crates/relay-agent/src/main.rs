//! # relay-agent
//!
//! Relay server binary: loads settings, initializes logging and metrics,
//! and serves workers and invocations until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::RelayServer;
use relay_settings::RelaySettings;

/// How long in-flight requests get to finish after Ctrl-C.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Relay bridge server.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Script-execution relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Per-invocation deadline in milliseconds, 0 to wait forever.
    #[arg(long)]
    invoke_timeout_ms: Option<u64>,
}

impl Cli {
    /// Load settings from disk and layer CLI flags on top.
    fn resolve_settings(&self) -> Result<RelaySettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(ms) = self.invoke_timeout_ms {
            settings.dispatch.invoke_timeout_ms = ms;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics_handle =
        relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let server = RelayServer::new(settings).with_metrics(metrics_handle);
    let handle = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        addr = %handle.addr,
        timeout_ms = server.settings().dispatch.invoke_timeout_ms,
        "relay agent listening on http://{}",
        handle.addr
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        connections = server.registry().connection_count(),
        "Shutting down..."
    );
    server.shutdown();
    let drained = handle.drain(SHUTDOWN_DRAIN_TIMEOUT).await;

    tracing::info!(drained, "Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let cli = Cli::parse_from(["relay-agent", "--settings", path.to_str().unwrap()]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.server.port, RelaySettings::default().server.port);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn cli_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":4000,"host":"0.0.0.0"}}"#).unwrap();

        let cli = Cli::parse_from([
            "relay-agent",
            "--settings",
            path.to_str().unwrap(),
            "--port",
            "0",
            "--log-level",
            "debug",
            "--invoke-timeout-ms",
            "0",
        ]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.dispatch.invoke_timeout_ms, 0);
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cli = Cli::parse_from(["relay-agent", "--settings", path.to_str().unwrap()]);
        assert!(cli.resolve_settings().is_err());
    }
}
