use thiserror::Error;

use crate::batch::BatchError;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("{0} payload is missing")]
    EmptyPayload(&'static str),
    #[error(transparent)]
    Batch(#[from] BatchError),
}
