//! Consumer side: per-exchange delivery loops feeding the batch writer.
//!
//! Each exchange gets its own bus channel (channels are single-threaded;
//! separate channels avoid head-of-line blocking between entity types), an
//! exclusive server-named queue, and one delivery-loop task. A delivery is
//! acked after a successful enqueue into the batch writer — not after the
//! flush — which is the accepted weakening of at-least-once delivery.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tickflow_domain::MarketDataSink;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::{BatchConfig, BatchError};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::metrics;
use crate::payload::BusMessage;
use crate::writer::BatchWriter;

/// Which entity stream a delivery loop serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Trades,
    Candles,
    OrderBooks,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Trades => "trades",
            StreamKind::Candles => "candles",
            StreamKind::OrderBooks => "orderbooks",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscribes to the three fan-out exchanges and forwards decoded entities
/// into the batch writer.
pub struct Consumer {
    cfg: BrokerConfig,
    conn: Connection,
    channels: Vec<Channel>,
    tasks: Vec<JoinHandle<()>>,
    batcher: Arc<BatchWriter>,
}

impl Consumer {
    /// Connect to the bus and build the batch writer over `sink`.
    pub async fn connect(
        cfg: BrokerConfig,
        sink: Arc<dyn MarketDataSink>,
    ) -> Result<Self, BrokerError> {
        if cfg.url.is_empty() {
            return Err(BrokerError::Config("rabbitmq url is required".into()));
        }
        let conn = Connection::connect(&cfg.url, ConnectionProperties::default()).await?;
        let batcher = Arc::new(BatchWriter::new(
            BatchConfig { size: cfg.batch_size, timeout: cfg.batch_timeout },
            sink,
        ));
        Ok(Self { cfg, conn, channels: Vec::new(), tasks: Vec::new(), batcher })
    }

    /// Declare the topology and start one delivery loop per exchange.
    pub async fn start(&mut self, ctx: &CancellationToken) -> Result<(), BrokerError> {
        self.batcher.run(ctx);

        let streams = [
            (StreamKind::Trades, self.cfg.trades_exchange.clone()),
            (StreamKind::Candles, self.cfg.candles_exchange.clone()),
            (StreamKind::OrderBooks, self.cfg.order_books_exchange.clone()),
        ];
        for (kind, exchange) in streams {
            self.start_stream(ctx, kind, &exchange).await?;
        }

        info!(
            trades = %self.cfg.trades_exchange,
            candles = %self.cfg.candles_exchange,
            orderbooks = %self.cfg.order_books_exchange,
            prefetch = self.cfg.prefetch,
            "bus consumer started"
        );
        Ok(())
    }

    async fn start_stream(
        &mut self,
        ctx: &CancellationToken,
        kind: StreamKind,
        exchange: &str,
    ) -> Result<(), BrokerError> {
        let channel = self.conn.create_channel().await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions { exclusive: true, auto_delete: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                queue.name().as_str(),
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_qos(self.cfg.prefetch.max(1), BasicQosOptions::default())
            .await?;

        let deliveries = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(stream = %kind, exchange = %exchange, queue = %queue.name(), "consuming");

        let loop_ctx = ctx.clone();
        let batcher = Arc::clone(&self.batcher);
        self.channels.push(channel);
        self.tasks
            .push(tokio::spawn(delivery_loop(loop_ctx, kind, deliveries, batcher)));
        Ok(())
    }

    /// Stop consuming, then flush pending batches with `drain_ctx` (a
    /// fresh short-timeout context, not the cancelled run context).
    pub async fn stop(&mut self, drain_ctx: &CancellationToken) -> Result<(), BatchError> {
        for channel in self.channels.drain(..) {
            if let Err(e) = channel.close(200, "consumer shutdown").await {
                warn!(error = %e, "failed to close consumer channel");
            }
        }
        if let Err(e) = self.conn.close(200, "consumer shutdown").await {
            warn!(error = %e, "failed to close bus connection");
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.batcher.stop(drain_ctx).await
    }
}

async fn delivery_loop(
    ctx: CancellationToken,
    kind: StreamKind,
    mut deliveries: lapin::Consumer,
    batcher: Arc<BatchWriter>,
) {
    loop {
        let delivery = tokio::select! {
            _ = ctx.cancelled() => return,
            delivery = deliveries.next() => delivery,
        };

        let Some(delivery) = delivery else {
            // Channel closed; shutdown is driven elsewhere.
            return;
        };
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(stream = %kind, error = %e, "delivery stream failed");
                return;
            }
        };
        metrics::record_consumed(kind.as_str());

        match handle_delivery(kind, &delivery.data, &batcher).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!(stream = %kind, error = %e, "failed to ack delivery");
                } else {
                    metrics::record_acked(kind.as_str());
                }
            }
            Err(e) => {
                warn!(stream = %kind, error = %e, "failed to process message");
                if let Err(e) = delivery
                    .nack(BasicNackOptions { requeue: true, ..Default::default() })
                    .await
                {
                    warn!(stream = %kind, error = %e, "failed to nack delivery");
                } else {
                    metrics::record_nacked(kind.as_str());
                }
            }
        }
    }
}

/// Decode one bus payload and enqueue it. The caller acks on `Ok` and
/// nacks-with-requeue on `Err`.
pub(crate) async fn handle_delivery(
    kind: StreamKind,
    body: &[u8],
    batcher: &BatchWriter,
) -> Result<(), BrokerError> {
    let payload: BusMessage = serde_json::from_slice(body).map_err(BrokerError::Decode)?;
    match kind {
        StreamKind::Trades => {
            let trade = payload.trade.ok_or(BrokerError::EmptyPayload("trade"))?;
            batcher.add_trade(&trade).await?;
        }
        StreamKind::Candles => {
            let candle = payload.candle.ok_or(BrokerError::EmptyPayload("candle"))?;
            batcher.add_candle(&candle).await?;
        }
        StreamKind::OrderBooks => {
            let snapshot = payload
                .order_book_snapshot
                .ok_or(BrokerError::EmptyPayload("order book"))?;
            batcher.add_order_book(&snapshot).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tickflow_domain::sink::BoxError;
    use tickflow_domain::{Candle, OrderBookSnapshot, Trade, TradeSide};
    use uuid::Uuid;

    use super::*;

    struct MemorySink {
        trades: Mutex<Vec<Trade>>,
        fail: bool,
    }

    impl MemorySink {
        fn new(fail: bool) -> Self {
            Self { trades: Mutex::new(Vec::new()), fail }
        }
    }

    #[async_trait]
    impl MarketDataSink for MemorySink {
        async fn add_trades(&self, trades: &[Trade]) -> Result<(), BoxError> {
            if self.fail {
                return Err("insert failed".into());
            }
            self.trades.lock().unwrap().extend_from_slice(trades);
            Ok(())
        }

        async fn add_candles(&self, _candles: &[Candle]) -> Result<(), BoxError> {
            Ok(())
        }

        async fn add_order_book_snapshots(
            &self,
            _snapshots: &[OrderBookSnapshot],
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn writer_over(sink: Arc<dyn MarketDataSink>) -> BatchWriter {
        let writer = BatchWriter::new(
            BatchConfig { size: 1, timeout: Duration::ZERO },
            sink,
        );
        writer.run(&CancellationToken::new());
        writer
    }

    fn trade_body() -> Vec<u8> {
        let message = BusMessage::trade(Trade {
            id: Uuid::new_v4(),
            instrument_uid: Uuid::new_v4(),
            side: TradeSide::Buy,
            price: Decimal::from(100),
            quantity_lots: 2,
            traded_at: "2024-01-01T12:00:00Z".parse().unwrap(),
            metadata: None,
        });
        serde_json::to_vec(&message).unwrap()
    }

    #[tokio::test]
    async fn successful_enqueue_reports_ok_for_ack() {
        let sink = Arc::new(MemorySink::new(false));
        let batcher = writer_over(Arc::clone(&sink) as Arc<dyn MarketDataSink>);

        handle_delivery(StreamKind::Trades, &trade_body(), &batcher)
            .await
            .unwrap();
        assert_eq!(sink.trades.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_enqueue_reports_err_for_nack() {
        let sink = Arc::new(MemorySink::new(true));
        let batcher = writer_over(sink as Arc<dyn MarketDataSink>);

        let result = handle_delivery(StreamKind::Trades, &trade_body(), &batcher).await;
        assert!(matches!(result, Err(BrokerError::Batch(_))));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let sink = Arc::new(MemorySink::new(false));
        let batcher = writer_over(sink as Arc<dyn MarketDataSink>);

        let result = handle_delivery(StreamKind::Trades, b"not json", &batcher).await;
        assert!(matches!(result, Err(BrokerError::Decode(_))));
    }

    #[tokio::test]
    async fn wrong_variant_for_stream_is_an_empty_payload() {
        let sink = Arc::new(MemorySink::new(false));
        let batcher = writer_over(sink as Arc<dyn MarketDataSink>);

        // A trade payload arriving on the candles stream has no candle set.
        let result = handle_delivery(StreamKind::Candles, &trade_body(), &batcher).await;
        assert!(matches!(result, Err(BrokerError::EmptyPayload("candle"))));
    }
}
