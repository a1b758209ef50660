//! Market data entities shared by the producer and consumer processes.
//!
//! Everything that crosses the message bus or lands in storage is defined
//! here: trades, OHLCV candles, and order book snapshots, keyed by an opaque
//! instrument UUID. All timestamps are UTC by construction.

pub mod candle;
pub mod orderbook;
pub mod sink;
pub mod trade;

pub use candle::Candle;
pub use orderbook::{OrderBookLevel, OrderBookSnapshot};
pub use sink::MarketDataSink;
pub use trade::{Trade, TradeSide};

/// Opaque diagnostic fields carried alongside an entity (upstream class
/// codes, raw enumeration names, consistency flags). The pipeline stores
/// and forwards this map but never reads it.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
