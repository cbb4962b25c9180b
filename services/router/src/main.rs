//! mcproxy
//!
//! L4 proxy for Minecraft Java Edition that routes by virtual host.
//!
//! This service:
//! - Loads hostname routes from a JSON route file and reloads it on change
//! - Accepts TCP connections and reads the client's handshake packet
//! - Picks the backend from the handshake's server address (or `default`)
//! - Relays bytes between client and backend until either side closes
//!
//! The `add-server`, `del-server` and `list` commands edit the route file.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcproxy_router::config::Config;
use mcproxy_router::sync;
use mcproxy_router::{
    Endpoint, JsonRouteFile, Listener, ListenerConfig, RouteSource, RouteTable,
};

#[derive(Debug, Parser)]
#[command(name = "mcproxy", version, about = "Route Minecraft connections by server address")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the proxy (default).
    Serve {
        /// Bind address, overrides MCPROXY_LISTEN and the route file.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Add or replace a route.
    AddServer {
        /// Server address as typed by players.
        hostname: String,
        /// Backend address (host:port).
        target: String,
    },
    /// Remove a route.
    DelServer {
        /// Server address to remove.
        hostname: String,
    },
    /// Print the configured routes.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve { listen: None }) {
        Command::Serve { listen } => serve(config, listen).await,
        Command::AddServer { hostname, target } => add_server(&config, &hostname, &target),
        Command::DelServer { hostname } => del_server(&config, &hostname),
        Command::List => list(&config),
    }
}

async fn serve(config: Config, cli_listen: Option<String>) -> Result<()> {
    // Initialize tracing (prefer RUST_LOG, fallback to MCPROXY_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting mcproxy");

    // Without routes there is nothing to serve.
    let store = Arc::new(JsonRouteFile::new(config.route_file.clone()));
    // Read before loading so an edit during startup is picked up by the reload loop.
    let applied = store.modified();
    let route_file = store.read().context("Route file unavailable at startup")?;

    let bind_addr = config.bind_addr(cli_listen.as_deref(), route_file.listen_addr());
    info!(
        route_file = %config.route_file.display(),
        bind_addr = %bind_addr,
        route_count = route_file.servers.len(),
        reload_interval_ms = config.reload_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let route_table = Arc::new(RouteTable::with_routes(route_file.servers));

    let mut listener_config = ListenerConfig::new(bind_addr.clone());
    listener_config.connect_timeout = config.connect_timeout;

    let listener = match Listener::bind(listener_config, Arc::clone(&route_table)).await {
        Ok(listener) => Arc::new(listener),
        Err(e) => {
            error!(bind_addr = %bind_addr, error = %e, "Failed to bind listener");
            return Err(e).with_context(|| format!("Failed to bind {}", bind_addr));
        }
    };

    let reload = tokio::spawn(sync::run_reload_loop(
        store,
        Arc::clone(&route_table),
        config.reload_interval,
        applied,
    ));

    let result = tokio::select! {
        result = listener.run() => result.context("Listener failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
    };

    reload.abort();
    result
}

fn add_server(config: &Config, hostname: &str, target: &str) -> Result<()> {
    validate_target(target)?;

    let store = JsonRouteFile::new(config.route_file.clone());
    match store.add_server(hostname, Endpoint::new(target))? {
        Some(previous) => println!("Updated {} -> {} (was {})", hostname, target, previous),
        None => println!("Added {} -> {}", hostname, target),
    }
    Ok(())
}

fn del_server(config: &Config, hostname: &str) -> Result<()> {
    let store = JsonRouteFile::new(config.route_file.clone());
    match store.del_server(hostname)? {
        Some(previous) => println!("Removed {} (was {})", hostname, previous),
        None => println!("No route for {}", hostname),
    }
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let store = JsonRouteFile::new(config.route_file.clone());
    let file = store.read()?;

    if let Some(listen) = file.listen_addr() {
        println!("listen: {}", listen);
    }
    for (hostname, target) in &file.servers {
        println!("{} -> {}", hostname, target);
    }
    Ok(())
}

/// Backend targets must carry an explicit numeric port.
fn validate_target(target: &str) -> Result<()> {
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => bail!("Target must be host:port, got '{}'", target),
    }
}
