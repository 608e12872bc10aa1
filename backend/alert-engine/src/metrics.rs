//! Prometheus counters for filtering and delivery

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Filter evaluations by outcome (allowed, blocked, error)
pub static FILTER_EVALUATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alert_filter_evaluations_total",
        "Total filter evaluations by outcome",
        &["outcome"]
    )
    .expect("failed to register alert_filter_evaluations_total")
});

/// Delivery attempts by final status
pub static DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alert_deliveries_total",
        "Total delivery attempts by final status",
        &["status"]
    )
    .expect("failed to register alert_deliveries_total")
});

/// Per-channel send failures
pub static CHANNEL_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "alert_channel_failures_total",
        "Channel send failures by channel",
        &["channel"]
    )
    .expect("failed to register alert_channel_failures_total")
});
