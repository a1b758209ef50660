use serde::{Deserialize, Serialize};
use tickflow_domain::{Candle, OrderBookSnapshot, Trade};

/// Bus payload envelope. Exactly one field is set per message; absent
/// fields are omitted from the JSON entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<Trade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candle: Option<Candle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_book_snapshot: Option<OrderBookSnapshot>,
}

impl BusMessage {
    pub fn trade(trade: Trade) -> Self {
        Self { trade: Some(trade), ..Default::default() }
    }

    pub fn candle(candle: Candle) -> Self {
        Self { candle: Some(candle), ..Default::default() }
    }

    pub fn order_book_snapshot(snapshot: OrderBookSnapshot) -> Self {
        Self { order_book_snapshot: Some(snapshot), ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tickflow_domain::TradeSide;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn envelope_omits_absent_variants() {
        let message = BusMessage::trade(Trade {
            id: Uuid::new_v4(),
            instrument_uid: Uuid::new_v4(),
            side: TradeSide::Sell,
            price: Decimal::from(10),
            quantity_lots: 1,
            traded_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            metadata: None,
        });

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"trade\""));
        assert!(!json.contains("candle"));
        assert!(!json.contains("order_book_snapshot"));

        let decoded: BusMessage = serde_json::from_str(&json).unwrap();
        assert!(decoded.trade.is_some());
        assert!(decoded.candle.is_none());
    }
}
