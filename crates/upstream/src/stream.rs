//! WebSocket stream client for the upstream market data API.
//!
//! One connection carries all three subscriptions. Each `subscribe_*` call
//! registers a bounded channel; [`MarketDataStream::listen`] then drives the
//! socket and routes every frame to the matching channel until the
//! connection drops or every receiver is gone.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;
use crate::wire::{CandleMessage, MarketDataEnvelope, OrderBookMessage, SubscriptionInterval, TradeMessage};

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const CHANNEL_CAPACITY: usize = 1024;

pub struct MarketDataStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    candle_tx: Option<mpsc::Sender<CandleMessage>>,
    trade_tx: Option<mpsc::Sender<TradeMessage>>,
    orderbook_tx: Option<mpsc::Sender<OrderBookMessage>>,
}

impl MarketDataStream {
    /// Connect and authenticate against the configured endpoint.
    pub async fn connect(cfg: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let mut request = cfg
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::Config(format!("invalid endpoint: {e}")))?;

        let auth = format!("Bearer {}", cfg.token)
            .parse()
            .map_err(|_| UpstreamError::Config("token is not a valid header value".into()))?;
        request.headers_mut().insert("authorization", auth);
        if let Ok(app_name) = cfg.app_name.parse() {
            request.headers_mut().insert("x-app-name", app_name);
        }

        let ws_config = WebSocketConfig {
            max_message_size: Some(MAX_MESSAGE_SIZE),
            ..Default::default()
        };

        let connector = if cfg.insecure_skip_verify {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        info!(endpoint = %cfg.endpoint, "connecting to upstream market data stream");
        let (ws, _) =
            connect_async_tls_with_config(request, Some(ws_config), false, connector).await?;
        info!("connected to upstream market data stream");

        Ok(Self {
            ws,
            candle_tx: None,
            trade_tx: None,
            orderbook_tx: None,
        })
    }

    /// Subscribe to closed candles for the given instruments.
    pub async fn subscribe_candles(
        &mut self,
        instruments: &[String],
        interval: SubscriptionInterval,
        waiting_close: bool,
    ) -> Result<mpsc::Receiver<CandleMessage>, UpstreamError> {
        let frame = json!({
            "subscribe_candles_request": {
                "instruments": instruments,
                "interval": interval,
                "waiting_close": waiting_close,
            }
        });
        self.send_frame(&frame)
            .await
            .map_err(|e| UpstreamError::Subscribe(format!("candles: {e}")))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.candle_tx = Some(tx);
        Ok(rx)
    }

    /// Subscribe to executed trades for the given instruments.
    pub async fn subscribe_trades(
        &mut self,
        instruments: &[String],
    ) -> Result<mpsc::Receiver<TradeMessage>, UpstreamError> {
        let frame = json!({
            "subscribe_trades_request": {
                "instruments": instruments,
            }
        });
        self.send_frame(&frame)
            .await
            .map_err(|e| UpstreamError::Subscribe(format!("trades: {e}")))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.trade_tx = Some(tx);
        Ok(rx)
    }

    /// Subscribe to order book snapshots at the given depth.
    pub async fn subscribe_order_books(
        &mut self,
        instruments: &[String],
        depth: i32,
    ) -> Result<mpsc::Receiver<OrderBookMessage>, UpstreamError> {
        let frame = json!({
            "subscribe_order_book_request": {
                "instruments": instruments,
                "depth": depth,
            }
        });
        self.send_frame(&frame)
            .await
            .map_err(|e| UpstreamError::Subscribe(format!("order books: {e}")))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.orderbook_tx = Some(tx);
        Ok(rx)
    }

    async fn send_frame(&mut self, frame: &serde_json::Value) -> Result<(), UpstreamError> {
        self.ws
            .send(tungstenite::Message::Text(frame.to_string()))
            .await?;
        Ok(())
    }

    /// Drive the connection, routing payload frames into the subscription
    /// channels. Returns `Ok(())` only when every receiver has been dropped
    /// (the pumps are shutting down); an upstream close is an error because
    /// the stream has no replay.
    pub async fn listen(mut self) -> Result<(), UpstreamError> {
        loop {
            let message = self
                .ws
                .next()
                .await
                .ok_or(UpstreamError::ConnectionClosed)?;

            let text = match message? {
                tungstenite::Message::Text(text) => text,
                tungstenite::Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("dropping non-utf8 binary frame");
                        continue;
                    }
                },
                tungstenite::Message::Ping(data) => {
                    self.ws.send(tungstenite::Message::Pong(data)).await?;
                    continue;
                }
                tungstenite::Message::Close(_) => return Err(UpstreamError::ConnectionClosed),
                _ => continue,
            };

            let envelope: MarketDataEnvelope = match serde_json::from_str(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "failed to parse stream frame");
                    continue;
                }
            };

            if !self.route(envelope).await {
                // All receivers are gone; the pumps have stopped.
                return Ok(());
            }
        }
    }

    /// Deliver one envelope. Returns false once the matching receiver (and
    /// therefore the owning pump) has been dropped.
    async fn route(&mut self, envelope: MarketDataEnvelope) -> bool {
        if let Some(trade) = envelope.trade {
            if let Some(tx) = &self.trade_tx {
                if tx.send(trade).await.is_err() {
                    return false;
                }
            }
            return true;
        }
        if let Some(candle) = envelope.candle {
            if let Some(tx) = &self.candle_tx {
                if tx.send(candle).await.is_err() {
                    return false;
                }
            }
            return true;
        }
        if let Some(orderbook) = envelope.orderbook {
            if let Some(tx) = &self.orderbook_tx {
                if tx.send(orderbook).await.is_err() {
                    return false;
                }
            }
            return true;
        }
        if envelope.ping.is_some() {
            return true;
        }
        if envelope.subscribe_candles_response.is_some()
            || envelope.subscribe_trades_response.is_some()
            || envelope.subscribe_order_book_response.is_some()
        {
            debug!("subscription acknowledged by upstream");
            return true;
        }
        debug!("ignoring unknown stream frame");
        true
    }
}
