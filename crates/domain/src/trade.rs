use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Metadata;

/// BUY/SELL direction derived from the upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(UnknownSide(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown trade side: {0}")]
pub struct UnknownSide(pub String);

/// A single executed trade.
///
/// Natural key: `(instrument_uid, traded_at, price, quantity_lots)`.
/// Duplicates under at-least-once delivery are tolerated; deduplication is
/// a downstream concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub instrument_uid: Uuid,
    pub side: TradeSide,
    pub price: Decimal,
    pub quantity_lots: i64,
    pub traded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_round_trips_through_str() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("SELL".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("HOLD".parse::<TradeSide>().is_err());
    }

    #[test]
    fn trade_json_round_trip() {
        let trade = Trade {
            id: Uuid::new_v4(),
            instrument_uid: Uuid::new_v4(),
            side: TradeSide::Buy,
            price: Decimal::new(1005, 1),
            quantity_lots: 3,
            traded_at: "2024-01-01T12:00:00Z".parse().unwrap(),
            metadata: None,
        };

        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"side\":\"BUY\""));
        // Absent metadata is omitted from the wire entirely
        assert!(!json.contains("metadata"));

        let decoded: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, trade);
    }
}
