//! Feed composition metrics
//!
//! Prometheus instruments for source attribution, degradation and request latency

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

use crate::models::Composition;

static CANDIDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_candidates_total",
        "Candidates delivered in composed pages, by first-attributed source",
        &["source"]
    )
    .expect("Failed to register feed candidates metric")
});

static SOURCE_DEGRADED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_source_degraded_total",
        "Sources that under-produced or failed and were recovered locally",
        &["source", "reason"]
    )
    .expect("Failed to register feed source degraded metric")
});

static COMPOSITION_FALLBACK_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_composition_fallback_total",
        "Compositions abandoned in favor of a discovery-only page"
    )
    .expect("Failed to register feed composition fallback metric")
});

static VIEW_HISTORY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_view_history_failures_total",
        "View history lookups that failed and degraded to an empty exclusion set"
    )
    .expect("Failed to register feed view history metric")
});

static REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_request_duration_seconds",
        "Duration of feed requests",
        &["outcome"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register feed request duration metric")
});

/// Record realized composition of a delivered page
pub fn record_composition(composition: &Composition) {
    for (source, count) in composition.iter() {
        CANDIDATES_TOTAL
            .with_label_values(&[source.as_str()])
            .inc_by(*count as u64);
    }
}

pub fn record_source_degraded(source: &str, reason: &str) {
    SOURCE_DEGRADED_TOTAL
        .with_label_values(&[source, reason])
        .inc();
}

pub fn record_composition_fallback() {
    COMPOSITION_FALLBACK_TOTAL.inc();
}

pub fn record_view_history_failure() {
    VIEW_HISTORY_FAILURES_TOTAL.inc();
}

/// outcome: ok / not_found / unavailable / invalid
pub fn record_request_duration(outcome: &str, duration: Duration) {
    REQUEST_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Render the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
