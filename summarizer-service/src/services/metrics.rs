//! Metrics collection and Prometheus export.
//!
//! HTTP request metrics come from `service_core::middleware::metrics`; this
//! module adds the summarizer counters and owns the /metrics renderer.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// How a `/summarize` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    Success,
    Rejected,
    StorageError,
    ProviderError,
}

impl SummaryOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryOutcome::Success => "success",
            SummaryOutcome::Rejected => "rejected",
            SummaryOutcome::StorageError => "storage_error",
            SummaryOutcome::ProviderError => "provider_error",
        }
    }
}

/// Install the Prometheus recorder. Call once at startup, before any metric
/// is recorded.
pub fn init_metrics() -> Result<(), BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    // A second call fails in install_recorder, so the cell is always empty here.
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

pub fn record_summary(outcome: SummaryOutcome) {
    counter!("summaries_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_provider_latency(provider: &'static str, elapsed: Duration) {
    histogram!("provider_request_duration_seconds", "provider" => provider)
        .record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(SummaryOutcome::Success.as_str(), "success");
        assert_eq!(SummaryOutcome::Rejected.as_str(), "rejected");
        assert_eq!(SummaryOutcome::StorageError.as_str(), "storage_error");
        assert_eq!(SummaryOutcome::ProviderError.as_str(), "provider_error");
    }

    #[test]
    fn render_without_recorder_is_a_comment() {
        // Recording without a recorder is a no-op.
        record_summary(SummaryOutcome::Success);
        if METRICS_HANDLE.get().is_none() {
            assert!(get_metrics().starts_with('#'));
        }
    }
}
