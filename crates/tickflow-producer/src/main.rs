//! Ingestion process: subscribes to the upstream market data stream and
//! publishes normalized entities onto the bus.
//!
//! Four cooperative tasks run under one cancellation context: the stream
//! listener plus one pump per entity type. The first failure cancels the
//! group — the upstream stream has no replay, so a publish failure is
//! fatal rather than silently lossy.

mod config;

use anyhow::Context;
use lapin::{Connection, ConnectionProperties};
use tickflow_broker::Publisher;
use tickflow_upstream::wire::{
    CandleMessage, OrderBookMessage, SubscriptionInterval, TradeMessage,
};
use tickflow_upstream::{codec, MarketDataStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ProducerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = ProducerConfig::load()?;

    let ctx = CancellationToken::new();
    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ctx.cancel();
    });

    let conn = Connection::connect(&cfg.rabbit_url, ConnectionProperties::default())
        .await
        .context("connect rabbitmq")?;
    let publisher = Publisher::new(&conn, cfg.exchanges.clone())
        .await
        .context("init publisher")?;

    let mut stream = MarketDataStream::connect(&cfg.upstream)
        .await
        .context("connect upstream stream")?;
    let candles = stream
        .subscribe_candles(
            &cfg.instruments,
            SubscriptionInterval::ONE_MINUTE,
            cfg.candle_waiting_close,
        )
        .await
        .context("subscribe candles")?;
    let trades = stream
        .subscribe_trades(&cfg.instruments)
        .await
        .context("subscribe trades")?;
    let order_books = stream
        .subscribe_order_books(&cfg.instruments, cfg.order_book_depth)
        .await
        .context("subscribe order books")?;

    info!(
        instruments = cfg.instruments.len(),
        trades_ex = %cfg.exchanges.trades,
        candles_ex = %cfg.exchanges.candles,
        orderbook_ex = %cfg.exchanges.order_books,
        "producer started"
    );

    let listener = {
        let ctx = ctx.clone();
        async move {
            tokio::select! {
                _ = ctx.cancelled() => Ok(()),
                result = stream.listen() => result.context("upstream stream"),
            }
        }
    };

    tokio::try_join!(
        listener,
        pump_candles(&ctx, candles, &publisher),
        pump_trades(&ctx, trades, &publisher),
        pump_order_books(&ctx, order_books, &publisher),
    )?;

    if let Err(e) = publisher.close().await {
        warn!(error = %e, "failed to close publisher channel");
    }
    if let Err(e) = conn.close(200, "producer shutdown").await {
        warn!(error = %e, "failed to close bus connection");
    }

    info!("producer stopped");
    Ok(())
}

async fn pump_candles(
    ctx: &CancellationToken,
    mut stream: mpsc::Receiver<CandleMessage>,
    publisher: &Publisher,
) -> anyhow::Result<()> {
    loop {
        let message = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            message = stream.recv() => message,
        };
        let Some(message) = message else { return Ok(()) };

        let candle = match codec::decode_candle(&message) {
            Ok(Some(candle)) => candle,
            Ok(None) => {
                warn!("skip candle with unsupported interval");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "skip candle");
                continue;
            }
        };
        publisher
            .publish_candle(&candle)
            .await
            .context("publish candle")?;
    }
}

async fn pump_trades(
    ctx: &CancellationToken,
    mut stream: mpsc::Receiver<TradeMessage>,
    publisher: &Publisher,
) -> anyhow::Result<()> {
    loop {
        let message = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            message = stream.recv() => message,
        };
        let Some(message) = message else { return Ok(()) };

        let trade = match codec::decode_trade(&message) {
            Ok(trade) => trade,
            Err(e) => {
                warn!(error = %e, "skip trade");
                continue;
            }
        };
        publisher
            .publish_trade(&trade)
            .await
            .context("publish trade")?;
    }
}

async fn pump_order_books(
    ctx: &CancellationToken,
    mut stream: mpsc::Receiver<OrderBookMessage>,
    publisher: &Publisher,
) -> anyhow::Result<()> {
    loop {
        let message = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            message = stream.recv() => message,
        };
        let Some(message) = message else { return Ok(()) };

        let snapshot = match codec::decode_orderbook(&message) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "skip order book");
                continue;
            }
        };
        publisher
            .publish_order_book(&snapshot)
            .await
            .context("publish order book")?;
    }
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
