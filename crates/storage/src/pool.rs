use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

use crate::error::StorageError;

/// Build a connection pool from a postgres DSN.
pub fn create_pool(dsn: &str) -> Result<Pool, StorageError> {
    let pg_config: tokio_postgres::Config = dsn
        .parse()
        .map_err(|e: tokio_postgres::Error| StorageError::Dsn(e.to_string()))?;

    let mut cfg = Config::new();
    if let Some(host) = pg_config.get_hosts().first() {
        match host {
            tokio_postgres::config::Host::Tcp(host) => cfg.host = Some(host.clone()),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(path) => {
                cfg.host = Some(path.to_string_lossy().to_string())
            }
        }
    }
    if let Some(port) = pg_config.get_ports().first() {
        cfg.port = Some(*port);
    }
    if let Some(user) = pg_config.get_user() {
        cfg.user = Some(user.to_string());
    }
    if let Some(password) = pg_config.get_password() {
        cfg.password = Some(String::from_utf8_lossy(password).to_string());
    }
    if let Some(dbname) = pg_config.get_dbname() {
        cfg.dbname = Some(dbname.to_string());
    }

    // NoTls: the store lives next to the consumer; for external databases
    // switch to tokio-postgres-rustls and sslmode=require.
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StorageError::Pool(e.to_string()))
}

/// Apply embedded migrations. Safe to run on every startup; the schema is
/// written with IF NOT EXISTS throughout.
pub async fn run_migrations(pool: &Pool) -> Result<(), StorageError> {
    let client = pool
        .get()
        .await
        .map_err(|e| StorageError::Pool(e.to_string()))?;

    let migration = include_str!("../migrations/001_initial.sql");
    client
        .batch_execute(migration)
        .await
        .map_err(|e| StorageError::Migration(format!("001_initial: {e}")))?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await
        .map_err(|e| StorageError::Migration(format!("schema_migrations: {e}")))?;

    client
        .execute(
            "INSERT INTO schema_migrations (version) VALUES ('001_initial')
             ON CONFLICT (version) DO NOTHING",
            &[],
        )
        .await
        .map_err(|e| StorageError::Migration(format!("record 001_initial: {e}")))?;

    info!("database migrations applied");
    Ok(())
}
