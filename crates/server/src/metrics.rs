//! Prometheus metrics
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the recorder.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n".to_string()),
    }
}

pub fn record_call_started() {
    metrics::counter!("call_bridge_calls_total").increment(1);
}

/// Mirror the call registry size
pub fn record_active_calls(count: usize) {
    metrics::gauge!("call_bridge_active_calls").set(count as f64);
}

pub fn record_frame_in() {
    metrics::counter!("call_bridge_frames_in_total").increment(1);
}

pub fn record_frame_out() {
    metrics::counter!("call_bridge_frames_out_total").increment(1);
}

pub fn record_frame_dropped() {
    metrics::counter!("call_bridge_frames_dropped_total").increment(1);
}

pub fn record_commit() {
    metrics::counter!("call_bridge_commits_total").increment(1);
}

pub fn record_tool_call(status: &'static str) {
    metrics::counter!("call_bridge_tool_calls_total", "status" => status).increment(1);
}

pub fn record_safety_clear() {
    metrics::counter!("call_bridge_safety_clears_total").increment(1);
}
