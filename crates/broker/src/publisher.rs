//! Producer-side publishing onto durable fan-out exchanges.

use std::collections::HashSet;

use chrono::Utc;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ExchangeKind};
use tickflow_domain::{Candle, OrderBookSnapshot, Trade};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::BrokerError;
use crate::metrics;
use crate::payload::BusMessage;

/// Exchange names for the three entity streams. The same name may be
/// reused across entity types; declaration is deduplicated.
#[derive(Debug, Clone)]
pub struct ExchangeSet {
    pub trades: String,
    pub candles: String,
    pub order_books: String,
}

/// Owns one publishing channel on the shared bus connection. The channel
/// is not safe for concurrent publishes, so all publishes are serialized
/// behind a mutex held across the network round trip.
pub struct Publisher {
    channel: Mutex<Channel>,
    exchanges: ExchangeSet,
}

impl Publisher {
    /// Open a channel and declare the three durable fan-out exchanges.
    pub async fn new(conn: &Connection, exchanges: ExchangeSet) -> Result<Self, BrokerError> {
        let channel = conn.create_channel().await?;

        let mut declared = HashSet::new();
        for name in [&exchanges.trades, &exchanges.candles, &exchanges.order_books] {
            if name.is_empty() {
                return Err(BrokerError::Config("exchange name cannot be empty".into()));
            }
            if !declared.insert(name.clone()) {
                continue;
            }
            channel
                .exchange_declare(
                    name,
                    ExchangeKind::Fanout,
                    ExchangeDeclareOptions { durable: true, ..Default::default() },
                    FieldTable::default(),
                )
                .await?;
            debug!(exchange = %name, "declared fanout exchange");
        }

        Ok(Self { channel: Mutex::new(channel), exchanges })
    }

    pub async fn publish_trade(&self, trade: &Trade) -> Result<(), BrokerError> {
        self.publish(&self.exchanges.trades, &BusMessage::trade(trade.clone()))
            .await
    }

    pub async fn publish_candle(&self, candle: &Candle) -> Result<(), BrokerError> {
        self.publish(&self.exchanges.candles, &BusMessage::candle(candle.clone()))
            .await
    }

    pub async fn publish_order_book(
        &self,
        snapshot: &OrderBookSnapshot,
    ) -> Result<(), BrokerError> {
        self.publish(
            &self.exchanges.order_books,
            &BusMessage::order_book_snapshot(snapshot.clone()),
        )
        .await
    }

    async fn publish(&self, exchange: &str, payload: &BusMessage) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(payload).map_err(BrokerError::Encode)?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2) // persistent
            .with_timestamp(Utc::now().timestamp() as u64);

        let channel = self.channel.lock().await;
        channel
            .basic_publish(exchange, "", BasicPublishOptions::default(), &body, properties)
            .await?
            .await?;
        drop(channel);

        metrics::record_published(exchange);
        Ok(())
    }

    /// Close the publishing channel. Publish failures are fatal upstream,
    /// so this only runs on clean shutdown.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let channel = self.channel.lock().await;
        channel.close(200, "producer shutdown").await?;
        Ok(())
    }
}
