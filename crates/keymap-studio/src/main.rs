//! Keymap studio entry point.
//!
//! Loads the device configuration, boots behavior local ids, and serves the
//! keymap RPC protocol until Ctrl+C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML device description
//!  └─ open_settings()         -- file or in-memory settings
//!  └─ assemble_service()      -- registry, local ids, layout + keymap stores
//!  └─ run_server()            -- TCP accept loop (Tokio tasks per client)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keymap_studio::application::startup::LocalIdBoot;
use keymap_studio::infrastructure::device::{assemble_service, open_settings};
use keymap_studio::infrastructure::network::rpc_server::{run_server, BroadcastNotifications};
use keymap_studio::infrastructure::storage::config::load_config;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote keymap editing service.
///
/// Serves the keymap RPC protocol so a configuration tool can read and change
/// the keymap and switch physical layouts.
#[derive(Debug, Parser)]
#[command(
    name = "keymap-studio",
    about = "Remote keymap editing service",
    version
)]
struct Cli {
    /// Device configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "KEYMAP_STUDIO_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `[device] listen_address`.
    #[arg(long, env = "KEYMAP_STUDIO_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log level, overriding `[device] log_level`.  `RUST_LOG` wins over both.
    #[arg(long, env = "KEYMAP_STUDIO_LOG_LEVEL")]
    log_level: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.device.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    info!("keymap studio starting");

    // Local ids must exist before the first request is accepted.
    let settings = open_settings(&config.device)?;
    let notifications = Arc::new(BroadcastNotifications::default());
    let boot = LocalIdBoot::new();
    let service = assemble_service(&config, settings, &boot, notifications.clone());

    let listen = cli.listen.unwrap_or(config.device.listen_address);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind keymap RPC listener on {listen}"))?;

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(
        listener,
        Arc::new(Mutex::new(service)),
        notifications,
        running,
    )
    .await?;

    info!("keymap studio stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_values_in_charge() {
        let cli = Cli::parse_from(["keymap-studio"]);

        assert!(cli.listen.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_cli_overrides_parse() {
        let cli = Cli::parse_from([
            "keymap-studio",
            "--config",
            "/etc/kb.toml",
            "--listen",
            "0.0.0.0:9000",
            "--log-level",
            "debug",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/kb.toml")));
        assert_eq!(cli.listen.map(|a| a.port()), Some(9000));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
