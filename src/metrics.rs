//! Prometheus counters for alarm cycles

use crate::dispatch::CycleReport;
use crate::error::{RelayError, Result};
use axum::{routing::get, Router};
use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::info;

const CYCLE_DURATION: &str = "alarm_relay_cycle_duration_ms";

/// Install the global Prometheus recorder. Call once per process.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(CYCLE_DURATION.to_string()),
            &[10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0],
        )
        .and_then(|builder| builder.install_recorder())
        .map_err(|e| RelayError::Config(format!("Failed to install metrics recorder: {}", e)))?;

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

pub fn record_cycle(report: &CycleReport) {
    counter!("alarm_relay_cycles_total").increment(1);
    counter!("alarm_relay_alarms_fetched_total").increment(report.alarms_fetched as u64);
    counter!("alarm_relay_notifications_total").increment(report.notifications_generated as u64);
    counter!("alarm_relay_sms_sent_total").increment(report.sms_sent as u64);
    counter!("alarm_relay_sms_failed_total").increment(report.sms_failed as u64);
    histogram!(CYCLE_DURATION).record(report.duration_ms as f64);
}

/// `GET /metrics` rendering the installed recorder
pub fn routes<S>(handle: PrometheusHandle) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}
