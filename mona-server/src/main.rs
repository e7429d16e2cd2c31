//! MonaBackend server
//!
//! Watches the ledger for payment milestones and pushes them to WebSocket
//! subscribers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, Overrides};
use mona_core::ledger::{JsonRpcLedgerClient, LedgerWatcher, LedgerWatcherRunner};
use mona_core::processors::Broadcaster;
use mona_core::registry::ConnectionRegistry;
use mona_core::state::StateStore;
use server::{build_router, run_server};
use shutdown::{shutdown_signal, stop_on};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// MonaBackend - payment milestone push server
#[derive(Parser, Debug)]
#[command(name = "mona-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (optional)
    #[arg(short, long, default_value = "./mona-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the listen port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Ledger JSON-RPC endpoint
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<Url>,

    /// Address of the contract emitting PaymentMilestoneReached
    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting mona-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(
        &args.config,
        Overrides {
            listen: args.listen,
            port: args.port,
            rpc_url: args.rpc_url,
            contract_address: args.contract_address,
        },
    );
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!(
        rpc_url = %loaded_config.watcher.rpc_url,
        contract = %loaded_config.watcher.contract_address,
        "Configuration loaded"
    );

    // Shared state: one store, one registry, passed to both loops
    let registry = ConnectionRegistry::new(StateStore::new(), loaded_config.registry);
    let broadcaster = Broadcaster::new(registry.clone());

    // Poll loop
    let (watcher_tx, watcher_rx) = watch::channel(false);
    let ledger_client = JsonRpcLedgerClient::new(
        loaded_config.watcher.rpc_url.clone(),
        loaded_config.watcher.request_timeout,
    );
    let watcher = LedgerWatcher::new(ledger_client, loaded_config.watcher);
    let watcher_handle =
        tokio::spawn(LedgerWatcherRunner::new(watcher, broadcaster, watcher_rx).run());

    // Admission loop
    let router = build_router(AppState::new(registry.clone()));
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(
        router,
        listen_addr,
        stop_on(shutdown_signal(), watcher_tx, registry),
    )
    .await;
    if let Err(e) = &result {
        tracing::error!("HTTP server failed: {}", e);
    }

    // The watcher sees the shutdown flag, or the dropped sender if the
    // server never started.
    if let Err(e) = watcher_handle.await {
        tracing::error!("LedgerWatcher task failed: {}", e);
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
