//! Prometheus metrics for the synchronization layer.
//!
//! This module provides metrics for:
//! - Frame receive/decode throughput
//! - Reassembly activity (merges, buffered-half evictions, violations)
//! - Connection lifecycle (reconnects, replayed commands)
//! - Frame processing latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::debug;

// === Metric Name Constants ===

/// Frames received counter metric name.
pub const METRIC_FRAMES_RECEIVED: &str = "hub_frames_received_total";
/// Frame decode failures counter metric name.
pub const METRIC_DECODE_FAILURES: &str = "hub_frame_decode_failures_total";
/// Reconnects counter metric name.
pub const METRIC_RECONNECTS: &str = "hub_reconnects_total";
/// Replayed commands counter metric name.
pub const METRIC_COMMANDS_REPLAYED: &str = "hub_commands_replayed_total";
/// Invocation failures counter metric name.
pub const METRIC_INVOKE_FAILURES: &str = "hub_invoke_failures_total";
/// Completed merges counter metric name.
pub const METRIC_MERGES: &str = "feed_merges_total";
/// Evicted buffered halves counter metric name.
pub const METRIC_HALVES_EVICTED: &str = "feed_halves_evicted_total";
/// Pairing violations counter metric name.
pub const METRIC_PAIRING_VIOLATIONS: &str = "feed_pairing_violations_total";
/// Dark-pool price updates counter metric name.
pub const METRIC_DARK_POOL_UPDATES: &str = "feed_dark_pool_updates_total";
/// Published depth rows counter metric name.
pub const METRIC_DEPTH_ROWS_PUBLISHED: &str = "feed_depth_rows_published_total";
/// Frame processing latency metric name.
pub const METRIC_FRAME_LATENCY: &str = "hub_frame_latency_ms";

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and register metric descriptions.
/// Call this once at startup; later calls reuse the installed handle.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);

    describe_counter!(METRIC_FRAMES_RECEIVED, "Total frames received from the hub");
    describe_counter!(
        METRIC_DECODE_FAILURES,
        "Total frames dropped because they failed to decode"
    );
    describe_counter!(METRIC_RECONNECTS, "Total reconnect attempts");
    describe_counter!(
        METRIC_COMMANDS_REPLAYED,
        "Total subscription commands replayed after reconnects"
    );
    describe_counter!(
        METRIC_INVOKE_FAILURES,
        "Total invocations answered with a non-success status token"
    );
    describe_counter!(METRIC_MERGES, "Total merged book updates produced");
    describe_counter!(
        METRIC_HALVES_EVICTED,
        "Total buffered halves evicted without a counterpart"
    );
    describe_counter!(
        METRIC_PAIRING_VIOLATIONS,
        "Total same-kind half pairs rejected"
    );
    describe_counter!(
        METRIC_DARK_POOL_UPDATES,
        "Total dark-pool price updates applied"
    );
    describe_counter!(
        METRIC_DEPTH_ROWS_PUBLISHED,
        "Total depth rows published to subscribers"
    );
    describe_histogram!(
        METRIC_FRAME_LATENCY,
        "Frame processing latency in milliseconds"
    );

    debug!("Metrics initialized");
    Ok(())
}

/// Rendered Prometheus exposition text, empty before [`init_metrics`].
pub fn render_prometheus() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Increment frames received.
pub fn inc_frames_received() {
    counter!(METRIC_FRAMES_RECEIVED).increment(1);
}

/// Increment decode failures.
pub fn inc_decode_failures() {
    counter!(METRIC_DECODE_FAILURES).increment(1);
}

/// Increment reconnect attempts.
pub fn inc_reconnects() {
    counter!(METRIC_RECONNECTS).increment(1);
}

/// Increment replayed commands by `count`.
pub fn inc_commands_replayed(count: u64) {
    counter!(METRIC_COMMANDS_REPLAYED).increment(count);
}

/// Increment invocation failures.
pub fn inc_invoke_failures() {
    counter!(METRIC_INVOKE_FAILURES).increment(1);
}

/// Increment completed merges.
pub fn inc_merges() {
    counter!(METRIC_MERGES).increment(1);
}

/// Increment evicted halves by `count`.
pub fn inc_halves_evicted(count: u64) {
    counter!(METRIC_HALVES_EVICTED).increment(count);
}

/// Increment pairing violations.
pub fn inc_pairing_violations() {
    counter!(METRIC_PAIRING_VIOLATIONS).increment(1);
}

/// Increment dark-pool updates.
pub fn inc_dark_pool_updates() {
    counter!(METRIC_DARK_POOL_UPDATES).increment(1);
}

/// Increment published depth rows.
pub fn inc_depth_rows_published() {
    counter!(METRIC_DEPTH_ROWS_PUBLISHED).increment(1);
}

/// Record frame processing latency from a start instant.
pub fn record_frame_latency(start: Instant) {
    histogram!(METRIC_FRAME_LATENCY).record(start.elapsed().as_secs_f64() * 1000.0);
}
