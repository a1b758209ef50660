//! TimescaleDB persistence for market data entities.
//!
//! Bulk inserts use the binary COPY protocol — one COPY statement per
//! batch, all-or-nothing. Reads come in two flavours per entity: a
//! time-range scan ordered ascending and a tail read ordered descending.

pub mod error;
pub mod pool;
pub mod repository;

pub use error::StorageError;
pub use pool::{create_pool, run_migrations};
pub use repository::MarketDataRepository;
