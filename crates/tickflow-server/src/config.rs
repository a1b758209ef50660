use anyhow::Context;
use tickflow_broker::BrokerConfig;

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug)]
pub struct ServerConfig {
    pub database_dsn: String,
    pub broker: BrokerConfig,
    pub http_host: String,
    pub http_port: u16,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let database_dsn = std::env::var("DATABASE_DSN")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_DSN is required")?;

        let broker = BrokerConfig::from_env().context("broker config")?;

        let http_host = std::env::var("HTTP_HOST")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string());
        let http_port = match std::env::var("HTTP_PORT") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse()
                .with_context(|| format!("parse HTTP_PORT={value:?}"))?,
            _ => DEFAULT_HTTP_PORT,
        };

        Ok(Self { database_dsn, broker, http_host, http_port })
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
