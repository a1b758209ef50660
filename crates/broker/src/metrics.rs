//! Prometheus counters for the bus pipeline, registered in the default
//! registry and exposed by the server's `/metrics` endpoint.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_published_total",
        "Messages published to the bus",
        &["exchange"]
    )
    .expect("register tickflow_published_total")
});

static CONSUMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_consumed_total",
        "Deliveries received from the bus",
        &["stream"]
    )
    .expect("register tickflow_consumed_total")
});

static ACKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_acked_total",
        "Deliveries acknowledged after a successful enqueue",
        &["stream"]
    )
    .expect("register tickflow_acked_total")
});

static NACKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_nacked_total",
        "Deliveries returned to the queue after a failure",
        &["stream"]
    )
    .expect("register tickflow_nacked_total")
});

static FLUSHED_ROWS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickflow_flushed_rows_total",
        "Rows handed to the persistence layer",
        &["entity"]
    )
    .expect("register tickflow_flushed_rows_total")
});

pub fn record_published(exchange: &str) {
    PUBLISHED_TOTAL.with_label_values(&[exchange]).inc();
}

pub fn record_consumed(stream: &str) {
    CONSUMED_TOTAL.with_label_values(&[stream]).inc();
}

pub fn record_acked(stream: &str) {
    ACKED_TOTAL.with_label_values(&[stream]).inc();
}

pub fn record_nacked(stream: &str) {
    NACKED_TOTAL.with_label_values(&[stream]).inc();
}

pub fn record_flushed(entity: &str, rows: usize) {
    FLUSHED_ROWS_TOTAL
        .with_label_values(&[entity])
        .inc_by(rows as u64);
}
