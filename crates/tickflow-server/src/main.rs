//! Consumer process: consumes the three bus exchanges into the store and
//! serves the read API.
//!
//! Shutdown sequence on SIGINT/SIGTERM: cancel the run context (delivery
//! loops stop at their next iteration), then drain the batch writer with a
//! fresh 10-second context so final persistence can complete even though
//! the run context is already cancelled.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tickflow_broker::Consumer;
use tickflow_domain::MarketDataSink;
use tickflow_storage::MarketDataRepository;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ServerConfig;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = ServerConfig::load()?;

    let pool = tickflow_storage::create_pool(&cfg.database_dsn).context("create pool")?;
    tickflow_storage::run_migrations(&pool)
        .await
        .context("run migrations")?;
    let repo = Arc::new(MarketDataRepository::new(pool));

    let ctx = CancellationToken::new();

    let mut consumer = Consumer::connect(
        cfg.broker.clone(),
        Arc::clone(&repo) as Arc<dyn MarketDataSink>,
    )
    .await
    .context("connect consumer")?;
    consumer.start(&ctx).await.context("start consumer")?;

    let listener = tokio::net::TcpListener::bind(cfg.http_addr())
        .await
        .with_context(|| format!("bind {}", cfg.http_addr()))?;
    info!(addr = %cfg.http_addr(), "http server listening");

    let app = tickflow_api::router(Arc::clone(&repo));
    let server_ctx = ctx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_ctx.cancelled().await })
            .await
    });

    shutdown_signal().await;
    info!("shutting down");
    ctx.cancel();

    // Pending batches flush under a fresh context so the cancelled run
    // context cannot abort final persistence. The timer bounds shutdown.
    let drain_ctx = CancellationToken::new();
    let deadline = drain_ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
        deadline.cancel();
    });
    if let Err(e) = consumer.stop(&drain_ctx).await {
        error!(error = %e, "batch drain failed during shutdown");
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http server error"),
        Err(e) => error!(error = %e, "http server task panicked"),
    }

    info!("server stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
