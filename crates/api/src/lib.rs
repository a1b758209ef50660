//! Read-side HTTP API for persisted market data.
//!
//! Serves time-range and tail reads per entity straight from the
//! repository, plus `/health` and Prometheus `/metrics`.

pub mod error;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tickflow_domain::{Candle, OrderBookSnapshot, Trade};
use tickflow_storage::MarketDataRepository;
use uuid::Uuid;

pub use error::ApiError;

/// Build the router over a shared repository.
pub fn router(repo: Arc<MarketDataRepository>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/v1/marketdata/trades", get(trades_between))
        .route("/api/v1/marketdata/trades/last", get(last_trades))
        .route("/api/v1/marketdata/candles", get(candles_between))
        .route("/api/v1/marketdata/candles/last", get(last_candles))
        .route("/api/v1/marketdata/orderbooks", get(orderbooks_between))
        .route("/api/v1/marketdata/orderbooks/last", get(last_orderbooks))
        .with_state(repo)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    instrument_uid: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TailQuery {
    instrument_uid: Uuid,
    limit: i64,
}

#[derive(Debug, Deserialize)]
struct CandleRangeQuery {
    instrument_uid: Uuid,
    interval_seconds: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CandleTailQuery {
    instrument_uid: Uuid,
    interval_seconds: i64,
    limit: i64,
}

#[derive(Debug, Deserialize)]
struct OrderBookRangeQuery {
    instrument_uid: Uuid,
    depth: i32,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OrderBookTailQuery {
    instrument_uid: Uuid,
    depth: i32,
    limit: i64,
}

async fn trades_between(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let trades = repo
        .get_trades_between(query.instrument_uid, query.from, query.to)
        .await?;
    Ok(Json(trades))
}

async fn last_trades(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<TailQuery>,
) -> Result<Json<Vec<Trade>>, ApiError> {
    let trades = repo
        .get_last_trades(query.instrument_uid, query.limit)
        .await?;
    Ok(Json(trades))
}

async fn candles_between(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<CandleRangeQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let candles = repo
        .get_candles_between(
            query.instrument_uid,
            query.interval_seconds,
            query.from,
            query.to,
        )
        .await?;
    Ok(Json(candles))
}

async fn last_candles(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<CandleTailQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let candles = repo
        .get_last_candles(query.instrument_uid, query.interval_seconds, query.limit)
        .await?;
    Ok(Json(candles))
}

async fn orderbooks_between(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<OrderBookRangeQuery>,
) -> Result<Json<Vec<OrderBookSnapshot>>, ApiError> {
    let snapshots = repo
        .get_order_book_snapshots_between(
            query.instrument_uid,
            query.depth,
            query.from,
            query.to,
        )
        .await?;
    Ok(Json(snapshots))
}

async fn last_orderbooks(
    State(repo): State<Arc<MarketDataRepository>>,
    Query(query): Query<OrderBookTailQuery>,
) -> Result<Json<Vec<OrderBookSnapshot>>, ApiError> {
    let snapshots = repo
        .get_last_order_book_snapshots(query.instrument_uid, query.depth, query.limit)
        .await?;
    Ok(Json(snapshots))
}
