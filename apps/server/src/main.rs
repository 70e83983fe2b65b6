//! WeMo Bridge - standalone headless bridge between Belkin WeMo appliances
//! and the home-automation bus.
//!
//! Discovers appliances on the LAN, exposes their channels on the local bus
//! and serves that bus over HTTP/WebSocket. Exits non-zero if the bus ever
//! refuses a device identity.

mod config;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use wemo_core::{bootstrap_services, start_server, AppState, LocalBus};

use crate::config::ServerConfig;

/// WeMo Bridge - headless WeMo to home-automation bus bridge.
#[derive(Parser, Debug)]
#[command(name = "wemo-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "WEMO_BRIDGE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file and environment).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Only discover on the interface with this IPv4 address.
    #[arg(short = 'i', long)]
    interface_ip: Option<Ipv4Addr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("WeMo Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ip) = args.interface_ip {
        config.interface_ip = Some(ip);
    }

    log::info!(
        "Configuration: bind_port={}, interface={}, scan={}s, poll={}s/{}s (motion)",
        config.bind_port,
        config
            .interface_ip
            .map_or_else(|| "all".to_string(), |ip| ip.to_string()),
        config.scan_timeout_secs,
        config.poll_interval_secs,
        config.motion_poll_interval_secs
    );

    let core_config = config.core_config()?;
    let bus = Arc::new(LocalBus::new(core_config.event_channel_capacity));
    let services =
        bootstrap_services(&core_config, bus).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    services
        .driver
        .start()
        .await
        .context("Failed to register the driver on the bus")?;

    let app_state = AppState::from_services(&services);
    let mut server = tokio::spawn(start_server(
        app_state,
        config.bind_port,
        services.cancel_token.child_token(),
    ));

    let outcome = tokio::select! {
        fatal = services.driver.run() => match fatal {
            Some(e) => {
                log::error!("Fatal: {}", e);
                Err(anyhow::Error::new(e).context("Bus refused a device registration"))
            }
            None => Ok(()),
        },
        result = &mut server => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server failed")),
            Err(e) => Err(anyhow::Error::new(e).context("HTTP server task failed")),
        },
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
            Ok(())
        }
    };

    // Graceful shutdown; cancelling the root token also stops the server
    services.shutdown().await;
    server.abort();

    log::info!("Shutdown complete");
    outcome
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
