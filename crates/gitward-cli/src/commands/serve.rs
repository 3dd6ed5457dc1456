//! `gitward serve` command - HTTP API plus periodic reconciliation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::server;
use crate::services::{Workspace, reconcile_all};

/// Run the serve command.
pub fn run(config: &Path) -> Result<()> {
    let ws = Arc::new(Workspace::load(config)?);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(ws))
}

async fn serve(ws: Arc<Workspace>) -> Result<()> {
    let listen = ws.config.server.listen;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;

    let period = Duration::from_secs(ws.config.sync.period_secs.max(1));
    let reconciler = tokio::spawn(reconcile_loop(Arc::clone(&ws), period));

    info!(%listen, apis = ws.config.apis.len(), "serving GitOps API");
    let router = server::create_router(ws);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reconciler.abort();
    info!("stopped");
    Ok(())
}

async fn reconcile_loop(ws: Arc<Workspace>, period: Duration) {
    if ws.config.repositories.is_empty() {
        return;
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        // Errors are logged per repository; the next tick retries.
        reconcile_all(Arc::clone(&ws), None).await;
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}
