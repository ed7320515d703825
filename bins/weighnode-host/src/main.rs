//! Weight node for Linux / desktop hosts.
//!
//! Runs the same boot sequence as the device firmware against a simulated
//! Wi-Fi station and load cell, then serves `/` and `/data` with Axum.

mod config;
mod sim;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weighnode_core::connection::resolve_self_test;
use weighnode_core::indicator::Indicator;
use weighnode_core::{
    BootDecision, ConnectionManager, ConnectionOutcome, Endpoints, EventBridge, Sampler,
};

use crate::config::{HostConfig, DEFAULT_CONFIG};
use crate::sim::{LogPin, SimLoadCell, SimNetif, SimStation};

#[derive(Parser)]
#[command(name = "weighnode")]
#[command(about = "Weight node with a simulated station and load cell")]
struct Cli {
    /// Path to the configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve HTTP on (defaults to 0.0.0.0 and `server.http_port`)
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "info,weighnode=debug,weighnode_core=debug,weighnode_server=debug".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(path = ?path, "Loading configuration");
            HostConfig::load(path)?
        }
        None => {
            tracing::info!("No configuration file given, using built-in defaults");
            HostConfig::from_toml_str(DEFAULT_CONFIG)?
        }
    };
    tracing::debug!("{:?}", config.node.network);

    tracing::info!("Weight node starting...");

    // Network bring-up blocks the boot thread until it has an outcome.
    loop {
        let boot_config = config.clone();
        let bring_up = tokio::task::spawn_blocking(move || connect(&boot_config))
            .await
            .context("Network bring-up task failed")?;

        match config.node.boot.decide(&bring_up.outcome) {
            BootDecision::Proceed => break,
            BootDecision::Abort => bail!("Network bring-up timed out, aborting boot"),
            BootDecision::Restart => {
                tracing::warn!("Restarting network bring-up");
            }
        }
    }

    let endpoints = Endpoints::new(
        Sampler::new(SimLoadCell::new(&config.simulation), &config.node.sensor),
        Indicator::new(LogPin, config.node.indicator.policy),
        config.node.payload.clone(),
    );

    let addr = cli
        .bind
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.node.server.http_port)));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Weight node ready!");
    tracing::info!("   Status: curl http://{}/", addr);
    tracing::info!("   Weight: curl http://{}/data", addr);

    tokio::select! {
        result = weighnode_server::serve(listener, Arc::new(endpoints)) => {
            result.context("HTTP server stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Result of one network bring-up.
struct BringUp {
    outcome: ConnectionOutcome,
    /// Address found by the DNS self-test, when one is configured.
    resolved: Option<IpAddr>,
}

/// Run one connection lifecycle against the simulated stack.
///
/// The DNS self-test runs whatever the outcome; it only reports.
fn connect(config: &HostConfig) -> BringUp {
    let network = &config.node.network;
    let (bridge, events) = EventBridge::new();

    let station = SimStation::new(events.clone(), &config.simulation, network.static_ip.is_none());
    let netif = SimNetif::new(events.clone());
    station.start();

    let mut manager = ConnectionManager::new(network, station, netif);
    let outcome = manager.run_to_completion(bridge, events, network.connect_timeout());

    let resolved = network
        .resolve_test
        .as_deref()
        .and_then(resolve_self_test);

    BringUp { outcome, resolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(text: &str) -> HostConfig {
        HostConfig::from_toml_str(text).unwrap()
    }

    #[test]
    fn test_resolve_runs_after_timeout() {
        let config = config(
            r#"
            [network]
            ssid = "lab"
            password = "secret-pass"
            connect_timeout_ms = 30
            resolve_test = "127.0.0.1"

            [simulation]
            stall = true
            "#,
        );

        let bring_up = connect(&config);

        assert_eq!(bring_up.outcome, ConnectionOutcome::TimedOut);
        assert_eq!(bring_up.resolved, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_resolve_runs_after_failure() {
        let config = config(
            r#"
            [network]
            ssid = "lab"
            password = "secret-pass"
            max_retries = 1
            resolve_test = "127.0.0.1"

            [simulation]
            disconnects = 5
            link_delay_ms = 1
            "#,
        );

        let bring_up = connect(&config);

        assert_eq!(bring_up.outcome, ConnectionOutcome::Failed { retries: 1 });
        assert_eq!(bring_up.resolved, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_no_resolve_without_host() {
        let config = config(
            r#"
            [network]
            ssid = "lab"
            password = "secret-pass"

            [simulation]
            link_delay_ms = 1
            "#,
        );

        let bring_up = connect(&config);

        assert!(matches!(bring_up.outcome, ConnectionOutcome::Connected(_)));
        assert_eq!(bring_up.resolved, None);
    }
}
