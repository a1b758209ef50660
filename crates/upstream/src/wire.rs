//! Wire shapes of the upstream streaming API.
//!
//! Enumerations arrive as integer codes; they are modelled as transparent
//! newtypes with named constants so unknown values survive deserialization
//! and can be rejected (or skipped) by the codec rather than the parser.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed-point quotation: integer units plus nanos of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub units: i64,
    pub nano: i32,
}

impl Quotation {
    /// `units + nano * 10⁻⁹` as an exact decimal.
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.units) + Decimal::new(i64::from(self.nano), 9)
    }
}

/// Trade direction code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeDirection(pub i32);

impl TradeDirection {
    pub const SELL: Self = Self(0);
    pub const BUY: Self = Self(1);
}

/// Candle subscription interval code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionInterval(pub i32);

impl SubscriptionInterval {
    pub const UNSPECIFIED: Self = Self(0);
    pub const ONE_MINUTE: Self = Self(1);
    pub const FIVE_MINUTES: Self = Self(2);
    pub const FIFTEEN_MINUTES: Self = Self(3);
    pub const ONE_HOUR: Self = Self(4);
    pub const ONE_DAY: Self = Self(5);

    /// Interval length for the intervals the pipeline persists. Returns
    /// `None` for everything else (those candles are skipped, not errors).
    pub fn as_seconds(self) -> Option<i64> {
        match self {
            Self::ONE_MINUTE => Some(60),
            Self::ONE_HOUR => Some(3600),
            Self::ONE_DAY => Some(86400),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ONE_MINUTE => "SUBSCRIPTION_INTERVAL_ONE_MINUTE",
            Self::FIVE_MINUTES => "SUBSCRIPTION_INTERVAL_FIVE_MINUTES",
            Self::FIFTEEN_MINUTES => "SUBSCRIPTION_INTERVAL_FIFTEEN_MINUTES",
            Self::ONE_HOUR => "SUBSCRIPTION_INTERVAL_ONE_HOUR",
            Self::ONE_DAY => "SUBSCRIPTION_INTERVAL_ONE_DAY",
            _ => "SUBSCRIPTION_INTERVAL_UNSPECIFIED",
        }
    }
}

/// Trade source code, carried into metadata only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeSourceType(pub i32);

impl TradeSourceType {
    pub const EXCHANGE: Self = Self(1);
    pub const DEALER: Self = Self(2);
    pub const ALL: Self = Self(3);

    pub fn name(self) -> &'static str {
        match self {
            Self::EXCHANGE => "TRADE_SOURCE_EXCHANGE",
            Self::DEALER => "TRADE_SOURCE_DEALER",
            Self::ALL => "TRADE_SOURCE_ALL",
            _ => "TRADE_SOURCE_UNSPECIFIED",
        }
    }
}

/// Order book flavour code, carried into metadata only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderBookType(pub i32);

impl OrderBookType {
    pub const EXCHANGE: Self = Self(1);
    pub const DEALER: Self = Self(2);
    pub const ALL: Self = Self(3);

    pub fn name(self) -> &'static str {
        match self {
            Self::EXCHANGE => "ORDERBOOK_TYPE_EXCHANGE",
            Self::DEALER => "ORDERBOOK_TYPE_DEALER",
            Self::ALL => "ORDERBOOK_TYPE_ALL",
            _ => "ORDERBOOK_TYPE_UNSPECIFIED",
        }
    }
}

/// Candle source code, carried into metadata only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandleSource(pub i32);

impl CandleSource {
    pub const EXCHANGE: Self = Self(1);
    pub const INCLUDE_WEEKEND: Self = Self(3);

    pub fn name(self) -> &'static str {
        match self {
            Self::EXCHANGE => "CANDLE_SOURCE_EXCHANGE",
            Self::INCLUDE_WEEKEND => "CANDLE_SOURCE_INCLUDE_WEEKEND",
            _ => "CANDLE_SOURCE_UNSPECIFIED",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeMessage {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_uid: String,
    #[serde(default)]
    pub direction: TradeDirection,
    pub price: Option<Quotation>,
    #[serde(default)]
    pub quantity: i64,
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trade_source: TradeSourceType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleMessage {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_uid: String,
    #[serde(default)]
    pub interval: SubscriptionInterval,
    pub time: Option<DateTime<Utc>>,
    pub open: Option<Quotation>,
    pub high: Option<Quotation>,
    pub low: Option<Quotation>,
    pub close: Option<Quotation>,
    #[serde(default)]
    pub volume: i64,
    pub last_trade_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub candle_source_type: CandleSource,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OrderLevel {
    pub price: Option<Quotation>,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookMessage {
    #[serde(default)]
    pub figi: String,
    #[serde(default)]
    pub instrument_uid: String,
    #[serde(default)]
    pub depth: i32,
    #[serde(default)]
    pub is_consistent: bool,
    #[serde(default)]
    pub bids: Vec<OrderLevel>,
    #[serde(default)]
    pub asks: Vec<OrderLevel>,
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub orderbook_type: OrderBookType,
}

/// One frame of the stream: exactly one of the payload fields is set.
/// Control frames (subscription acks, ping) are surfaced so the listener
/// can log or answer them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDataEnvelope {
    pub trade: Option<TradeMessage>,
    pub candle: Option<CandleMessage>,
    pub orderbook: Option<OrderBookMessage>,
    pub subscribe_candles_response: Option<serde_json::Value>,
    pub subscribe_trades_response: Option<serde_json::Value>,
    pub subscribe_order_book_response: Option<serde_json::Value>,
    pub ping: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotation_to_decimal() {
        let q = Quotation { units: 100, nano: 500_000_000 };
        assert_eq!(q.to_decimal(), Decimal::new(1005, 1));

        let q = Quotation { units: -2, nano: -250_000_000 };
        assert_eq!(q.to_decimal(), Decimal::new(-225, 2));
    }

    #[test]
    fn interval_mapping() {
        assert_eq!(SubscriptionInterval::ONE_MINUTE.as_seconds(), Some(60));
        assert_eq!(SubscriptionInterval::ONE_HOUR.as_seconds(), Some(3600));
        assert_eq!(SubscriptionInterval::ONE_DAY.as_seconds(), Some(86400));
        assert_eq!(SubscriptionInterval::FIVE_MINUTES.as_seconds(), None);
        assert_eq!(SubscriptionInterval(99).as_seconds(), None);
    }

    #[test]
    fn envelope_routes_single_payload() {
        let frame = r#"{"trade":{"instrument_uid":"6afa6f80-3581-4d55-84fa-66e1d0a1ea27","direction":1,"price":{"units":10,"nano":0},"quantity":2,"time":"2024-01-01T12:00:00Z"}}"#;
        let envelope: MarketDataEnvelope = serde_json::from_str(frame).unwrap();
        assert!(envelope.trade.is_some());
        assert!(envelope.candle.is_none());
        assert!(envelope.orderbook.is_none());
    }
}
