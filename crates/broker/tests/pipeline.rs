//! End-to-end tests over the consumer-side pipeline: bus payload decode,
//! batch writer hand-off, ordering, and drain, against an in-memory sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tickflow_broker::batch::BatchConfig;
use tickflow_broker::{BatchWriter, BusMessage};
use tickflow_domain::sink::BoxError;
use tickflow_domain::{Candle, MarketDataSink, OrderBookSnapshot, Trade, TradeSide};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
struct MemorySink {
    trade_batches: Mutex<Vec<Vec<Trade>>>,
}

#[async_trait]
impl MarketDataSink for MemorySink {
    async fn add_trades(&self, trades: &[Trade]) -> Result<(), BoxError> {
        self.trade_batches.lock().unwrap().push(trades.to_vec());
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

fn trade(quantity_lots: i64) -> Trade {
    Trade {
        id: Uuid::new_v4(),
        instrument_uid: Uuid::new_v4(),
        side: TradeSide::Buy,
        price: Decimal::new(1005, 1),
        quantity_lots,
        traded_at: "2024-01-01T12:00:00Z".parse().unwrap(),
        metadata: None,
    }
}

#[tokio::test]
async fn delivery_order_is_preserved_across_batches() {
    let sink = Arc::new(MemorySink::default());
    let writer = BatchWriter::new(
        BatchConfig { size: 3, timeout: Duration::from_secs(3600) },
        Arc::clone(&sink) as Arc<dyn MarketDataSink>,
    );
    let ctx = CancellationToken::new();
    writer.run(&ctx);

    // Seven deliveries in order: two size-triggered batches plus one drained.
    for quantity in 1..=7 {
        writer.add_trade(&trade(quantity)).await.unwrap();
    }
    writer.stop(&CancellationToken::new()).await.unwrap();

    let batches = sink.trade_batches.lock().unwrap();
    assert_eq!(batches.len(), 3);
    let quantities: Vec<i64> = batches
        .iter()
        .flatten()
        .map(|trade| trade.quantity_lots)
        .collect();
    assert_eq!(quantities, vec![1, 2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn bus_round_trip_preserves_the_entity() {
    let original = trade(3);
    let body = serde_json::to_vec(&BusMessage::trade(original.clone())).unwrap();

    let decoded: BusMessage = serde_json::from_slice(&body).unwrap();
    assert_eq!(decoded.trade.unwrap(), original);
}

#[tokio::test]
async fn enqueue_fails_once_the_run_context_is_cancelled() {
    let sink = Arc::new(MemorySink::default());
    let writer = BatchWriter::new(
        BatchConfig { size: 100, timeout: Duration::from_secs(1) },
        Arc::clone(&sink) as Arc<dyn MarketDataSink>,
    );
    let ctx = CancellationToken::new();
    writer.run(&ctx);
    ctx.cancel();

    assert!(writer.add_trade(&trade(1)).await.is_err());

    // Nothing was buffered, so the drain flushes nothing.
    writer.stop(&CancellationToken::new()).await.unwrap();
    assert!(sink.trade_batches.lock().unwrap().is_empty());
}
