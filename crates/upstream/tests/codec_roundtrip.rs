//! Decoded entities must survive the JSON hop across the bus unchanged.

use chrono::{TimeZone, Utc};
use tickflow_domain::{Candle, OrderBookSnapshot, Trade};
use tickflow_upstream::wire::{
    CandleMessage, OrderBookMessage, OrderLevel, Quotation, SubscriptionInterval,
    TradeDirection, TradeMessage,
};
use tickflow_upstream::{decode_candle, decode_orderbook, decode_trade};

const UID: &str = "6afa6f80-3581-4d55-84fa-66e1d0a1ea27";

#[test]
fn trade_round_trips_through_json() {
    let message = TradeMessage {
        figi: "BBG004730N88".into(),
        instrument_uid: UID.into(),
        direction: TradeDirection::BUY,
        price: Some(Quotation { units: 100, nano: 500_000_000 }),
        quantity: 3,
        time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        trade_source: Default::default(),
    };

    let decoded = decode_trade(&message).unwrap();
    let json = serde_json::to_vec(&decoded).unwrap();
    let restored: Trade = serde_json::from_slice(&json).unwrap();
    assert_eq!(restored, decoded);
}

#[test]
fn candle_round_trips_through_json() {
    let message = CandleMessage {
        figi: "BBG004730N88".into(),
        instrument_uid: UID.into(),
        interval: SubscriptionInterval::ONE_HOUR,
        time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        open: Some(Quotation { units: 100, nano: 0 }),
        high: Some(Quotation { units: 102, nano: 750_000_000 }),
        low: Some(Quotation { units: 99, nano: 0 }),
        close: Some(Quotation { units: 101, nano: 0 }),
        volume: 1200,
        last_trade_ts: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 59, 58).unwrap()),
        candle_source_type: Default::default(),
    };

    let decoded = decode_candle(&message).unwrap().unwrap();
    assert_eq!(decoded.interval_seconds, 3600);

    let json = serde_json::to_vec(&decoded).unwrap();
    let restored: Candle = serde_json::from_slice(&json).unwrap();
    assert_eq!(restored, decoded);
}

#[test]
fn orderbook_round_trips_through_json() {
    let message = OrderBookMessage {
        figi: String::new(),
        instrument_uid: UID.into(),
        depth: 3,
        is_consistent: true,
        bids: vec![
            OrderLevel { price: Some(Quotation { units: 100, nano: 0 }), quantity: 10 },
            OrderLevel { price: Some(Quotation { units: 99, nano: 900_000_000 }), quantity: 4 },
        ],
        asks: vec![
            OrderLevel { price: Some(Quotation { units: 100, nano: 100_000_000 }), quantity: 6 },
        ],
        time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        orderbook_type: Default::default(),
    };

    let decoded = decode_orderbook(&message).unwrap();
    let json = serde_json::to_vec(&decoded).unwrap();
    let restored: OrderBookSnapshot = serde_json::from_slice(&json).unwrap();
    assert_eq!(restored, decoded);
    assert_eq!(restored.bids.len(), 2);
}
