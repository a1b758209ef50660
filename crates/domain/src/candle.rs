use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// An OHLCV record for a fixed interval, pre-aggregated by the upstream.
///
/// Natural key: `(instrument_uid, interval_seconds, period_start)` — unique
/// in storage. A later arrival for the same key is a correction; under the
/// append-only bulk insert contract the first arrival wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub id: Uuid,
    pub instrument_uid: Uuid,
    pub interval_seconds: i64,
    pub period_start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume_lots: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_buy_lots: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_sell_lots: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trade_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_json_round_trip_keeps_optionals() {
        let candle = Candle {
            id: Uuid::new_v4(),
            instrument_uid: Uuid::new_v4(),
            interval_seconds: 60,
            period_start: "2024-01-01T12:00:00Z".parse().unwrap(),
            open: Decimal::new(1000, 1),
            high: Decimal::new(1010, 1),
            low: Decimal::new(995, 1),
            close: Decimal::new(1002, 1),
            volume_lots: 42,
            volume_buy_lots: Some(30),
            volume_sell_lots: None,
            last_trade_at: Some("2024-01-01T12:00:59Z".parse().unwrap()),
            metadata: None,
        };

        let json = serde_json::to_string(&candle).unwrap();
        assert!(!json.contains("volume_sell_lots"));
        let decoded: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, candle);
    }
}
