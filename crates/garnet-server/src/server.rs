//! Startup sequence and the TCP accept loop.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::connection;
use crate::recovery;
use crate::snapshot;
use crate::state::AppState;

/// Runs the startup sequence: AOF replay, writer install, snapshot
/// load, and the background tickers. Call once, before serving.
pub async fn bootstrap(state: &Arc<AppState>) {
    recovery::replay_aof(state).await;
    recovery::install_aof_writer(state).await;
    recovery::load_snapshot(state).await;
    snapshot::spawn_tickers(state);
    snapshot::spawn_aof_flush_ticker(state);
}

/// Binds the configured port and serves until the listener fails.
pub async fn run(state: &Arc<AppState>) -> io::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    serve(listener, state.clone()).await
}

/// Accept loop: one task per connection, each holding a cheap clone of
/// the shared state handle.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        state.stats.total_connections.fetch_add(1, Ordering::Relaxed);
        state.stats.connected_clients.fetch_add(1, Ordering::Relaxed);

        let state = state.clone();
        tokio::spawn(async move {
            debug!("accepted connection from {peer}");
            if let Err(e) = connection::handle(stream, &state).await {
                error!("connection error from {peer}: {e}");
            }
            state.stats.connected_clients.fetch_sub(1, Ordering::Relaxed);
            debug!("connection closed: {peer}");
        });
    }
}
