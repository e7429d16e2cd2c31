//! Signal handling and graceful shutdown.

use mona_core::registry::ConnectionRegistry;
use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C). A handler that cannot be
/// installed is logged and never fires.
pub async fn shutdown_signal() {
    let terminate = wait_for(SignalKind::terminate(), "SIGTERM");
    let interrupt = wait_for(SignalKind::interrupt(), "SIGINT");

    tokio::select! {
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = interrupt => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

async fn wait_for(kind: SignalKind, name: &'static str) {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, signal = name, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for `signal`, then stop the poll loop and close every subscriber.
///
/// Meant to be passed to axum's graceful shutdown, so the HTTP server
/// drains only after both have happened.
pub async fn stop_on(
    signal: impl Future<Output = ()>,
    watcher_shutdown: watch::Sender<bool>,
    registry: ConnectionRegistry,
) {
    signal.await;

    if watcher_shutdown.send(true).is_err() {
        tracing::debug!("LedgerWatcher already stopped");
    }
    let closed = registry.close_all();
    tracing::info!(closed, "Subscribers disconnected, draining HTTP server");
}
