//! Message bus plumbing for the tickflow pipeline.
//!
//! The producer side is [`Publisher`]: one channel, three durable fan-out
//! exchanges, JSON payloads. The consumer side is [`Consumer`]: one bus
//! channel and one delivery loop per exchange, feeding a [`BatchWriter`]
//! that coalesces entities into size- or timeout-triggered bulk inserts.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod publisher;
pub mod writer;

pub use batch::{BatchBuffer, BatchConfig, BatchError};
pub use config::BrokerConfig;
pub use consumer::Consumer;
pub use error::BrokerError;
pub use payload::BusMessage;
pub use publisher::{ExchangeSet, Publisher};
pub use writer::BatchWriter;
