//! Prometheus metrics for the ingestion pipeline and the rollup runner.
//!
//! Metric recording goes through the `metrics` facade. Until
//! [`init_metrics`] installs the Prometheus recorder every macro call is a
//! no-op, so library code and tests can record unconditionally.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const INGEST_DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Install the Prometheus recorder.
///
/// Calling this again after a successful install is a no-op.
pub fn init_metrics() -> anyhow::Result<()> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(INGEST_DURATION_BUCKETS)?
        .install_recorder()?;

    register_metric_descriptions();

    let _ = PROMETHEUS_HANDLE.set(handle);

    tracing::info!("Prometheus metrics recorder installed");
    Ok(())
}

/// Render all metrics in Prometheus text format. Empty when no recorder is installed.
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

fn register_metric_descriptions() {
    describe_counter!(
        "analytics_events_received_total",
        "Messages received from the bus"
    );
    describe_counter!(
        "analytics_events_stored_total",
        "Events appended to the event store"
    );
    describe_counter!(
        "analytics_events_rejected_total",
        "Messages dropped, labelled by reason"
    );
    describe_counter!(
        "analytics_store_retries_total",
        "Retried event store appends"
    );
    describe_counter!(
        "analytics_rollup_runs_total",
        "Rollup runs, labelled by outcome"
    );
    describe_counter!("analytics_errors_total", "Errors by code and category");
    describe_histogram!(
        "analytics_ingest_duration_seconds",
        "Time from receiving a message to finishing it"
    );
}

/// Counters and histograms for the ingestion consumer.
pub struct IngestionMetrics;

impl IngestionMetrics {
    pub fn received() {
        counter!("analytics_events_received_total").increment(1);
    }

    pub fn stored() {
        counter!("analytics_events_stored_total").increment(1);
    }

    pub fn rejected(reason: &'static str) {
        counter!("analytics_events_rejected_total", "reason" => reason).increment(1);
    }

    pub fn retried() {
        counter!("analytics_store_retries_total").increment(1);
    }

    pub fn duration(elapsed: Duration) {
        histogram!("analytics_ingest_duration_seconds").record(elapsed.as_secs_f64());
    }
}

/// Counters for the rollup runner.
pub struct RollupMetrics;

impl RollupMetrics {
    pub fn run(outcome: &'static str) {
        counter!("analytics_rollup_runs_total", "outcome" => outcome).increment(1);
    }
}
