//! Client for the upstream market data streaming API.
//!
//! Three logical channels (candles, trades, order books) are multiplexed
//! over one WebSocket connection. [`wire`] mirrors the upstream message
//! shapes, [`codec`] is the only place that translates them into domain
//! entities, and [`stream`] owns the connection and subscription plumbing.

pub mod codec;
pub mod config;
pub mod error;
pub mod stream;
pub mod wire;

pub use codec::{decode_candle, decode_orderbook, decode_trade};
pub use config::UpstreamConfig;
pub use error::{CodecError, UpstreamError};
pub use stream::MarketDataStream;
