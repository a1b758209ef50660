use crate::error::UpstreamError;

const DEFAULT_ENDPOINT: &str = "wss://invest-public-api.tinkoff.ru:443/market-data/stream";
const DEFAULT_APP_NAME: &str = "tickflow-producer";

/// Connection settings for the upstream streaming API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub token: String,
    pub endpoint: String,
    pub app_name: String,
    pub insecure_skip_verify: bool,
}

impl UpstreamConfig {
    pub fn from_env() -> Result<Self, UpstreamError> {
        let token = env_trimmed("INVEST_TOKEN");
        if token.is_empty() {
            return Err(UpstreamError::Config("INVEST_TOKEN is required".into()));
        }

        Ok(Self {
            token,
            endpoint: env_or("INVEST_ENDPOINT", DEFAULT_ENDPOINT),
            app_name: env_or("INVEST_APP_NAME", DEFAULT_APP_NAME),
            insecure_skip_verify: bool_env("INVEST_INSECURE_SKIP_VERIFY", true),
        })
    }
}

fn env_trimmed(key: &str) -> String {
    std::env::var(key).unwrap_or_default().trim().to_string()
}

fn env_or(key: &str, fallback: &str) -> String {
    let value = env_trimmed(key);
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn bool_env(key: &str, fallback: bool) -> bool {
    match env_trimmed(key).to_ascii_lowercase().as_str() {
        "" => fallback,
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => fallback,
    }
}
