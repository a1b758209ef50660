//! Translation from upstream wire messages into domain entities.
//!
//! This is the only module that knows the upstream wire shape; both the
//! producer and (via bus payloads built from its output) the consumer see
//! fully normalized entities. Timestamps are UTC already at the wire layer,
//! so nothing past this boundary can observe a naive instant.

use serde_json::Value;
use tickflow_domain::{Candle, Metadata, OrderBookLevel, OrderBookSnapshot, Trade, TradeSide};
use uuid::Uuid;

use crate::error::CodecError;
use crate::wire::{CandleMessage, OrderBookMessage, TradeDirection, TradeMessage};

/// Decode one trade message.
///
/// Direction 1 maps to BUY and 0 to SELL; any other code is unsupported.
pub fn decode_trade(msg: &TradeMessage) -> Result<Trade, CodecError> {
    let instrument_uid = parse_instrument_uid(&msg.instrument_uid)?;

    let side = match msg.direction {
        TradeDirection::BUY => TradeSide::Buy,
        TradeDirection::SELL => TradeSide::Sell,
        TradeDirection(other) => {
            return Err(CodecError::Unsupported(format!("trade direction: {other}")))
        }
    };

    let price = msg
        .price
        .ok_or_else(|| CodecError::BadPayload("trade price is missing".into()))?;
    let traded_at = msg
        .time
        .ok_or_else(|| CodecError::BadPayload("trade time is missing".into()))?;

    let mut metadata = Metadata::new();
    let figi = msg.figi.trim();
    if !figi.is_empty() {
        metadata.insert("figi".into(), Value::from(figi));
    }
    metadata.insert("trade_source".into(), Value::from(msg.trade_source.name()));

    Ok(Trade {
        id: Uuid::new_v4(),
        instrument_uid,
        side,
        price: price.to_decimal(),
        quantity_lots: msg.quantity,
        traded_at,
        metadata: finish_metadata(metadata),
    })
}

/// Decode one candle message.
///
/// Returns `Ok(None)` for subscription intervals the pipeline does not
/// persist; the caller drops the message without surfacing an error.
pub fn decode_candle(msg: &CandleMessage) -> Result<Option<Candle>, CodecError> {
    let Some(interval_seconds) = msg.interval.as_seconds() else {
        return Ok(None);
    };

    let instrument_uid = parse_instrument_uid(&msg.instrument_uid)?;
    let period_start = msg
        .time
        .ok_or_else(|| CodecError::BadPayload("candle period start is missing".into()))?;

    let open = require_quotation(msg.open, "open")?;
    let high = require_quotation(msg.high, "high")?;
    let low = require_quotation(msg.low, "low")?;
    let close = require_quotation(msg.close, "close")?;

    let mut metadata = Metadata::new();
    let figi = msg.figi.trim();
    if !figi.is_empty() {
        metadata.insert("figi".into(), Value::from(figi));
    }
    metadata.insert("interval".into(), Value::from(msg.interval.name()));
    metadata.insert("source".into(), Value::from(msg.candle_source_type.name()));

    Ok(Some(Candle {
        id: Uuid::new_v4(),
        instrument_uid,
        interval_seconds,
        period_start,
        open,
        high,
        low,
        close,
        volume_lots: msg.volume,
        volume_buy_lots: None,
        volume_sell_lots: None,
        last_trade_at: msg.last_trade_ts,
        metadata: finish_metadata(metadata),
    }))
}

/// Decode one order book message. Level order is preserved as delivered.
pub fn decode_orderbook(msg: &OrderBookMessage) -> Result<OrderBookSnapshot, CodecError> {
    let instrument_uid = parse_instrument_uid(&msg.instrument_uid)?;
    let snapshot_at = msg
        .time
        .ok_or_else(|| CodecError::BadPayload("order book time is missing".into()))?;

    let depth = msg.depth;
    if msg.bids.len() > depth.max(0) as usize || msg.asks.len() > depth.max(0) as usize {
        return Err(CodecError::BadPayload(format!(
            "order book has {} bids / {} asks for depth {}",
            msg.bids.len(),
            msg.asks.len(),
            depth
        )));
    }

    let bids = decode_levels(&msg.bids, "bid")?;
    let asks = decode_levels(&msg.asks, "ask")?;

    let mut metadata = Metadata::new();
    let figi = msg.figi.trim();
    if !figi.is_empty() {
        metadata.insert("figi".into(), Value::from(figi));
    }
    metadata.insert("is_consistent".into(), Value::from(msg.is_consistent));
    metadata.insert(
        "order_book_type".into(),
        Value::from(msg.orderbook_type.name()),
    );

    Ok(OrderBookSnapshot {
        id: Uuid::new_v4(),
        instrument_uid,
        snapshot_at,
        depth,
        bids,
        asks,
        metadata: finish_metadata(metadata),
    })
}

fn decode_levels(
    levels: &[crate::wire::OrderLevel],
    side: &str,
) -> Result<Vec<OrderBookLevel>, CodecError> {
    levels
        .iter()
        .map(|level| {
            let price = level
                .price
                .ok_or_else(|| CodecError::BadPayload(format!("{side} level price is missing")))?;
            Ok(OrderBookLevel {
                price: price.to_decimal(),
                quantity_lots: level.quantity,
            })
        })
        .collect()
}

fn require_quotation(
    quotation: Option<crate::wire::Quotation>,
    field: &str,
) -> Result<rust_decimal::Decimal, CodecError> {
    quotation
        .map(crate::wire::Quotation::to_decimal)
        .ok_or_else(|| CodecError::BadPayload(format!("candle {field} is missing")))
}

fn parse_instrument_uid(raw: &str) -> Result<Uuid, CodecError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CodecError::BadPayload("instrument uid is empty".into()));
    }
    Uuid::parse_str(value)
        .map_err(|e| CodecError::BadPayload(format!("parse instrument uid: {e}")))
}

fn finish_metadata(metadata: Metadata) -> Option<Metadata> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}
