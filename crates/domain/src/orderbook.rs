use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// Price/quantity pair for one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity_lots: i64,
}

/// A captured order book at a specific time and depth.
///
/// `bids` are sorted by price descending and `asks` ascending as delivered
/// by the upstream; the pipeline preserves that order and never re-sorts.
/// Natural key: `(instrument_uid, snapshot_at, depth)` — unique in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub id: Uuid,
    pub instrument_uid: Uuid,
    pub snapshot_at: DateTime<Utc>,
    pub depth: i32,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_round_trip_preserves_level_order() {
        let snapshot = OrderBookSnapshot {
            id: Uuid::new_v4(),
            instrument_uid: Uuid::new_v4(),
            snapshot_at: "2024-01-01T12:00:00Z".parse().unwrap(),
            depth: 10,
            bids: vec![
                OrderBookLevel { price: Decimal::new(1001, 1), quantity_lots: 5 },
                OrderBookLevel { price: Decimal::new(1000, 1), quantity_lots: 7 },
            ],
            asks: vec![
                OrderBookLevel { price: Decimal::new(1002, 1), quantity_lots: 2 },
                OrderBookLevel { price: Decimal::new(1003, 1), quantity_lots: 9 },
            ],
            metadata: None,
        };

        let json = serde_json::to_vec(&snapshot).unwrap();
        let decoded: OrderBookSnapshot = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.bids[0].price, Decimal::new(1001, 1));
        assert_eq!(decoded.asks[1].quantity_lots, 9);
    }
}
