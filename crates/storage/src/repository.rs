use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use futures_util::pin_mut;
use serde_json::Value;
use tickflow_domain::sink::BoxError;
use tickflow_domain::{
    Candle, MarketDataSink, Metadata, OrderBookSnapshot, Trade, TradeSide,
};
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::StorageError;

/// Persistence for the three market data entities over a shared pool.
pub struct MarketDataRepository {
    pool: Pool,
}

impl MarketDataRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Pool(e.to_string()))
    }

    // Trades

    /// Bulk insert via binary COPY: one statement per batch, all-or-nothing.
    /// Entities without an id get one assigned here, on the first
    /// persistence attempt.
    pub async fn add_trades(&self, trades: &[Trade]) -> Result<(), StorageError> {
        if trades.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let sink = client
            .copy_in(
                "COPY trades (trade_id, instrument_uid, side, price, quantity_lots, traded_at, metadata) \
                 FROM STDIN BINARY",
            )
            .await?;
        let writer = BinaryCopyInWriter::new(
            sink,
            &[
                Type::UUID,
                Type::UUID,
                Type::TEXT,
                Type::NUMERIC,
                Type::INT8,
                Type::TIMESTAMPTZ,
                Type::JSONB,
            ],
        );
        pin_mut!(writer);

        for trade in trades {
            let id = ensure_id(trade.id);
            let side = trade.side.as_str();
            let metadata = metadata_value(&trade.metadata);
            writer
                .as_mut()
                .write(&[
                    &id,
                    &trade.instrument_uid,
                    &side,
                    &trade.price,
                    &trade.quantity_lots,
                    &trade.traded_at,
                    &metadata,
                ])
                .await?;
        }
        writer.finish().await?;
        Ok(())
    }

    pub async fn get_trades_between(
        &self,
        instrument_uid: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StorageError> {
        let (from, to) = ordered_range(from, to);
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT trade_id, instrument_uid, side, price, quantity_lots, traded_at, metadata
                 FROM trades
                 WHERE instrument_uid = $1 AND traded_at >= $2 AND traded_at <= $3
                 ORDER BY traded_at ASC",
                &[&instrument_uid, &from, &to],
            )
            .await?;
        rows.iter().map(row_to_trade).collect()
    }

    pub async fn get_last_trades(
        &self,
        instrument_uid: Uuid,
        limit: i64,
    ) -> Result<Vec<Trade>, StorageError> {
        if limit <= 0 {
            return Err(StorageError::Invalid("limit must be positive"));
        }
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT trade_id, instrument_uid, side, price, quantity_lots, traded_at, metadata
                 FROM trades
                 WHERE instrument_uid = $1
                 ORDER BY traded_at DESC
                 LIMIT $2",
                &[&instrument_uid, &limit],
            )
            .await?;
        rows.iter().map(row_to_trade).collect()
    }

    // Candles

    pub async fn add_candles(&self, candles: &[Candle]) -> Result<(), StorageError> {
        if candles.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let sink = client
            .copy_in(
                "COPY candles (candle_id, instrument_uid, interval_seconds, period_start, \
                 open, high, low, close, volume_lots, volume_buy_lots, volume_sell_lots, \
                 last_trade_at, metadata) FROM STDIN BINARY",
            )
            .await?;
        let writer = BinaryCopyInWriter::new(
            sink,
            &[
                Type::UUID,
                Type::UUID,
                Type::INT8,
                Type::TIMESTAMPTZ,
                Type::NUMERIC,
                Type::NUMERIC,
                Type::NUMERIC,
                Type::NUMERIC,
                Type::INT8,
                Type::INT8,
                Type::INT8,
                Type::TIMESTAMPTZ,
                Type::JSONB,
            ],
        );
        pin_mut!(writer);

        for candle in candles {
            let id = ensure_id(candle.id);
            let metadata = metadata_value(&candle.metadata);
            writer
                .as_mut()
                .write(&[
                    &id,
                    &candle.instrument_uid,
                    &candle.interval_seconds,
                    &candle.period_start,
                    &candle.open,
                    &candle.high,
                    &candle.low,
                    &candle.close,
                    &candle.volume_lots,
                    &candle.volume_buy_lots,
                    &candle.volume_sell_lots,
                    &candle.last_trade_at,
                    &metadata,
                ])
                .await?;
        }
        writer.finish().await?;
        Ok(())
    }

    pub async fn get_candles_between(
        &self,
        instrument_uid: Uuid,
        interval_seconds: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StorageError> {
        if interval_seconds <= 0 {
            return Err(StorageError::Invalid("interval seconds must be positive"));
        }
        let (from, to) = ordered_range(from, to);
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT candle_id, instrument_uid, interval_seconds, period_start,
                        open, high, low, close,
                        volume_lots, volume_buy_lots, volume_sell_lots,
                        last_trade_at, metadata
                 FROM candles
                 WHERE instrument_uid = $1
                   AND interval_seconds = $2
                   AND period_start >= $3
                   AND period_start <= $4
                 ORDER BY period_start ASC",
                &[&instrument_uid, &interval_seconds, &from, &to],
            )
            .await?;
        rows.iter().map(row_to_candle).collect()
    }

    pub async fn get_last_candles(
        &self,
        instrument_uid: Uuid,
        interval_seconds: i64,
        limit: i64,
    ) -> Result<Vec<Candle>, StorageError> {
        if interval_seconds <= 0 {
            return Err(StorageError::Invalid("interval seconds must be positive"));
        }
        if limit <= 0 {
            return Err(StorageError::Invalid("limit must be positive"));
        }
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT candle_id, instrument_uid, interval_seconds, period_start,
                        open, high, low, close,
                        volume_lots, volume_buy_lots, volume_sell_lots,
                        last_trade_at, metadata
                 FROM candles
                 WHERE instrument_uid = $1 AND interval_seconds = $2
                 ORDER BY period_start DESC
                 LIMIT $3",
                &[&instrument_uid, &interval_seconds, &limit],
            )
            .await?;
        rows.iter().map(row_to_candle).collect()
    }

    // Order book snapshots

    pub async fn add_order_book_snapshots(
        &self,
        snapshots: &[OrderBookSnapshot],
    ) -> Result<(), StorageError> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let sink = client
            .copy_in(
                "COPY order_book_snapshots (snapshot_id, instrument_uid, snapshot_at, depth, \
                 bids, asks, metadata) FROM STDIN BINARY",
            )
            .await?;
        let writer = BinaryCopyInWriter::new(
            sink,
            &[
                Type::UUID,
                Type::UUID,
                Type::TIMESTAMPTZ,
                Type::INT4,
                Type::JSONB,
                Type::JSONB,
                Type::JSONB,
            ],
        );
        pin_mut!(writer);

        for snapshot in snapshots {
            let id = ensure_id(snapshot.id);
            let bids = serde_json::to_value(&snapshot.bids)?;
            let asks = serde_json::to_value(&snapshot.asks)?;
            let metadata = metadata_value(&snapshot.metadata);
            writer
                .as_mut()
                .write(&[
                    &id,
                    &snapshot.instrument_uid,
                    &snapshot.snapshot_at,
                    &snapshot.depth,
                    &bids,
                    &asks,
                    &metadata,
                ])
                .await?;
        }
        writer.finish().await?;
        Ok(())
    }

    pub async fn get_order_book_snapshots_between(
        &self,
        instrument_uid: Uuid,
        depth: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OrderBookSnapshot>, StorageError> {
        if depth <= 0 {
            return Err(StorageError::Invalid("depth must be positive"));
        }
        let (from, to) = ordered_range(from, to);
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT snapshot_id, instrument_uid, snapshot_at, depth, bids, asks, metadata
                 FROM order_book_snapshots
                 WHERE instrument_uid = $1
                   AND depth = $2
                   AND snapshot_at >= $3
                   AND snapshot_at <= $4
                 ORDER BY snapshot_at ASC",
                &[&instrument_uid, &depth, &from, &to],
            )
            .await?;
        rows.iter().map(row_to_snapshot).collect()
    }

    pub async fn get_last_order_book_snapshots(
        &self,
        instrument_uid: Uuid,
        depth: i32,
        limit: i64,
    ) -> Result<Vec<OrderBookSnapshot>, StorageError> {
        if depth <= 0 {
            return Err(StorageError::Invalid("depth must be positive"));
        }
        if limit <= 0 {
            return Err(StorageError::Invalid("limit must be positive"));
        }
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT snapshot_id, instrument_uid, snapshot_at, depth, bids, asks, metadata
                 FROM order_book_snapshots
                 WHERE instrument_uid = $1 AND depth = $2
                 ORDER BY snapshot_at DESC
                 LIMIT $3",
                &[&instrument_uid, &depth, &limit],
            )
            .await?;
        rows.iter().map(row_to_snapshot).collect()
    }
}

#[async_trait]
impl MarketDataSink for MarketDataRepository {
    async fn add_trades(&self, trades: &[Trade]) -> Result<(), BoxError> {
        MarketDataRepository::add_trades(self, trades)
            .await
            .map_err(Into::into)
    }

    async fn add_candles(&self, candles: &[Candle]) -> Result<(), BoxError> {
        MarketDataRepository::add_candles(self, candles)
            .await
            .map_err(Into::into)
    }

    async fn add_order_book_snapshots(
        &self,
        snapshots: &[OrderBookSnapshot],
    ) -> Result<(), BoxError> {
        MarketDataRepository::add_order_book_snapshots(self, snapshots)
            .await
            .map_err(Into::into)
    }
}

fn ensure_id(id: Uuid) -> Uuid {
    if id.is_nil() {
        Uuid::new_v4()
    } else {
        id
    }
}

fn ordered_range(from: DateTime<Utc>, to: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    if from > to {
        (to, from)
    } else {
        (from, to)
    }
}

fn metadata_value(metadata: &Option<Metadata>) -> Option<Value> {
    metadata.as_ref().map(|m| Value::Object(m.clone()))
}

fn value_to_metadata(value: Option<Value>) -> Option<Metadata> {
    match value {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn row_to_trade(row: &Row) -> Result<Trade, StorageError> {
    let side: String = row.try_get("side")?;
    let side: TradeSide = side
        .parse()
        .map_err(|_| StorageError::Invalid("unknown trade side in storage"))?;
    Ok(Trade {
        id: row.try_get("trade_id")?,
        instrument_uid: row.try_get("instrument_uid")?,
        side,
        price: row.try_get("price")?,
        quantity_lots: row.try_get("quantity_lots")?,
        traded_at: row.try_get("traded_at")?,
        metadata: value_to_metadata(row.try_get("metadata")?),
    })
}

fn row_to_candle(row: &Row) -> Result<Candle, StorageError> {
    Ok(Candle {
        id: row.try_get("candle_id")?,
        instrument_uid: row.try_get("instrument_uid")?,
        interval_seconds: row.try_get("interval_seconds")?,
        period_start: row.try_get("period_start")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume_lots: row.try_get("volume_lots")?,
        volume_buy_lots: row.try_get("volume_buy_lots")?,
        volume_sell_lots: row.try_get("volume_sell_lots")?,
        last_trade_at: row.try_get("last_trade_at")?,
        metadata: value_to_metadata(row.try_get("metadata")?),
    })
}

fn row_to_snapshot(row: &Row) -> Result<OrderBookSnapshot, StorageError> {
    let bids: Value = row.try_get("bids")?;
    let asks: Value = row.try_get("asks")?;
    Ok(OrderBookSnapshot {
        id: row.try_get("snapshot_id")?,
        instrument_uid: row.try_get("instrument_uid")?,
        snapshot_at: row.try_get("snapshot_at")?,
        depth: row.try_get("depth")?,
        bids: serde_json::from_value(bids)?,
        asks: serde_json::from_value(asks)?,
        metadata: value_to_metadata(row.try_get("metadata")?),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tickflow_domain::OrderBookLevel;

    use super::*;

    #[test]
    fn nil_ids_are_assigned_on_persistence() {
        assert!(!ensure_id(Uuid::nil()).is_nil());
        let id = Uuid::new_v4();
        assert_eq!(ensure_id(id), id);
    }

    #[test]
    fn inverted_ranges_are_normalized() {
        let early: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let late: DateTime<Utc> = "2024-02-01T00:00:00Z".parse().unwrap();
        assert_eq!(ordered_range(late, early), (early, late));
        assert_eq!(ordered_range(early, late), (early, late));
    }

    #[test]
    fn metadata_round_trips_through_jsonb_value() {
        let mut metadata = Metadata::new();
        metadata.insert("figi".into(), Value::from("BBG004730N88"));
        let value = metadata_value(&Some(metadata.clone()));
        assert_eq!(value_to_metadata(value), Some(metadata));
        assert_eq!(value_to_metadata(metadata_value(&None)), None);
    }

    #[test]
    fn levels_survive_the_jsonb_encoding() {
        let levels = vec![
            OrderBookLevel { price: Decimal::new(1015, 1), quantity_lots: 4 },
            OrderBookLevel { price: Decimal::new(1014, 1), quantity_lots: 9 },
        ];
        let value = serde_json::to_value(&levels).unwrap();
        let decoded: Vec<OrderBookLevel> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, levels);
    }
}
