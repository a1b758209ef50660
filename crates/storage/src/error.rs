use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid dsn: {0}")]
    Dsn(String),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
