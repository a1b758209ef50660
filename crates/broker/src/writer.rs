//! Typed, per-entity batch writer in front of the persistence sink.

use std::sync::Arc;

use tickflow_domain::{Candle, MarketDataSink, OrderBookSnapshot, Trade};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchBuffer, BatchConfig, BatchError, FlushFn};
use crate::metrics;

/// Three batch buffers — one per entity type — multiplexed behind a single
/// enqueue surface. Entities are copied on enqueue, so callers may reuse
/// their staging records freely.
pub struct BatchWriter {
    trades: BatchBuffer<Trade>,
    candles: BatchBuffer<Candle>,
    order_books: BatchBuffer<OrderBookSnapshot>,
}

impl BatchWriter {
    pub fn new(cfg: BatchConfig, sink: Arc<dyn MarketDataSink>) -> Self {
        let trade_sink = Arc::clone(&sink);
        let trade_flush: FlushFn<Trade> = Arc::new(move |batch: Vec<Trade>| {
            let sink = Arc::clone(&trade_sink);
            Box::pin(async move {
                sink.add_trades(&batch)
                    .await
                    .map_err(|e| BatchError::Flush(e.to_string()))?;
                metrics::record_flushed("trade", batch.len());
                Ok(())
            })
        });
        let trades = BatchBuffer::new(cfg, "trade", trade_flush);

        let candle_sink = Arc::clone(&sink);
        let candle_flush: FlushFn<Candle> = Arc::new(move |batch: Vec<Candle>| {
            let sink = Arc::clone(&candle_sink);
            Box::pin(async move {
                sink.add_candles(&batch)
                    .await
                    .map_err(|e| BatchError::Flush(e.to_string()))?;
                metrics::record_flushed("candle", batch.len());
                Ok(())
            })
        });
        let candles = BatchBuffer::new(cfg, "candle", candle_flush);

        let orderbook_sink = sink;
        let orderbook_flush: FlushFn<OrderBookSnapshot> =
            Arc::new(move |batch: Vec<OrderBookSnapshot>| {
                let sink = Arc::clone(&orderbook_sink);
                Box::pin(async move {
                    sink.add_order_book_snapshots(&batch)
                        .await
                        .map_err(|e| BatchError::Flush(e.to_string()))?;
                    metrics::record_flushed("orderbook", batch.len());
                    Ok(())
                })
            });
        let order_books = BatchBuffer::new(cfg, "orderbook", orderbook_flush);

        Self { trades, candles, order_books }
    }

    /// Install the base context for asynchronous flushes in all buffers.
    pub fn run(&self, ctx: &CancellationToken) {
        self.trades.set_context(ctx.clone());
        self.candles.set_context(ctx.clone());
        self.order_books.set_context(ctx.clone());
    }

    /// Install `ctx` (normally a fresh, short-lived drain context) and
    /// flush whatever every buffer still holds. Drain failures are joined
    /// into one error but never prevent the remaining buffers from
    /// draining.
    pub async fn stop(&self, ctx: &CancellationToken) -> Result<(), BatchError> {
        self.run(ctx);

        let mut failures = Vec::new();
        if let Err(e) = self.trades.drain(ctx).await {
            failures.push(format!("trade: {e}"));
        }
        if let Err(e) = self.candles.drain(ctx).await {
            failures.push(format!("candle: {e}"));
        }
        if let Err(e) = self.order_books.drain(ctx).await {
            failures.push(format!("orderbook: {e}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchError::Drain(failures.join("; ")))
        }
    }

    pub async fn add_trade(&self, trade: &Trade) -> Result<(), BatchError> {
        self.trades.enqueue(trade.clone()).await
    }

    pub async fn add_candle(&self, candle: &Candle) -> Result<(), BatchError> {
        self.candles.enqueue(candle.clone()).await
    }

    pub async fn add_order_book(&self, snapshot: &OrderBookSnapshot) -> Result<(), BatchError> {
        self.order_books.enqueue(snapshot.clone()).await
    }
}
