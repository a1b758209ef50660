use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tickflow_broker::publisher::ExchangeSet;
use tickflow_broker::BrokerConfig;
use tickflow_upstream::UpstreamConfig;

const DEFAULT_INSTRUMENTS_FILE: &str = "instruments.json";
const DEFAULT_ORDERBOOK_DEPTH: i32 = 10;

#[derive(Debug)]
pub struct ProducerConfig {
    pub upstream: UpstreamConfig,
    pub rabbit_url: String,
    pub exchanges: ExchangeSet,
    pub instruments: Vec<String>,
    pub order_book_depth: i32,
    pub candle_waiting_close: bool,
}

impl ProducerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let upstream = UpstreamConfig::from_env().context("upstream config")?;
        let broker = BrokerConfig::from_env().context("broker config")?;

        let instruments_file = std::env::var("INSTRUMENTS_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUMENTS_FILE.to_string());
        let instruments = read_instruments(Path::new(&instruments_file))?;

        let order_book_depth = match std::env::var("ORDERBOOK_DEPTH") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<i32>()
                .with_context(|| format!("parse ORDERBOOK_DEPTH={value:?}"))?,
            _ => DEFAULT_ORDERBOOK_DEPTH,
        };

        let candle_waiting_close = match std::env::var("CANDLE_WAITING_CLOSE") {
            Ok(value) => !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no"
            ),
            Err(_) => true,
        };

        Ok(Self {
            upstream,
            rabbit_url: broker.url,
            exchanges: ExchangeSet {
                trades: broker.trades_exchange,
                candles: broker.candles_exchange,
                order_books: broker.order_books_exchange,
            },
            instruments,
            order_book_depth: order_book_depth.max(1),
            candle_waiting_close,
        })
    }
}

#[derive(Deserialize)]
struct InstrumentsFile {
    #[serde(default)]
    instruments: Vec<String>,
}

fn read_instruments(path: &Path) -> anyhow::Result<Vec<String>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read instruments file {}", path.display()))?;
    let parsed: InstrumentsFile =
        serde_json::from_str(&data).context("parse instruments file")?;

    let instruments: Vec<String> = parsed
        .instruments
        .into_iter()
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty())
        .collect();
    if instruments.is_empty() {
        bail!("instruments list is empty");
    }
    Ok(instruments)
}
