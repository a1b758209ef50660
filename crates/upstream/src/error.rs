use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the streaming connection itself.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("tls setup failed: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection closed by upstream")]
    ConnectionClosed,
}

/// Failures translating one wire message into a domain entity.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message is well-formed but carries a value the pipeline does not
    /// handle (e.g. an unknown trade direction).
    #[error("unsupported {0}")]
    Unsupported(String),
    /// The message is missing required fields or carries garbage.
    #[error("bad payload: {0}")]
    BadPayload(String),
}
