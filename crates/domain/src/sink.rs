use async_trait::async_trait;

use crate::{Candle, OrderBookSnapshot, Trade};

/// Boxed error carried across the sink seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bulk persistence surface consumed by the batch writer.
///
/// Each call is all-or-nothing at the persistence level: a partial failure
/// surfaces as one error for the whole batch.
#[async_trait]
pub trait MarketDataSink: Send + Sync {
    async fn add_trades(&self, trades: &[Trade]) -> Result<(), BoxError>;
    async fn add_candles(&self, candles: &[Candle]) -> Result<(), BoxError>;
    async fn add_order_book_snapshots(
        &self,
        snapshots: &[OrderBookSnapshot],
    ) -> Result<(), BoxError>;
}
