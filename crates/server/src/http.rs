//! HTTP Endpoints
//!
//! Health, readiness, metrics and the telephony media stream route.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::telephony::media_stream_handler;

/// Upper bound for plain HTTP requests; upgraded sockets are not affected
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let media_path = state.settings.telephony.path.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(&media_path, get(media_stream_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness plus a view of the calls in progress
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.calls.list();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": calls.len(),
        "calls": calls,
    }))
}

/// Ready once the AI leg can authenticate
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let api_key = state.has_api_key();
    let tools = state.tools.declarations().len();

    let status = if api_key {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": api_key,
            "checks": {
                "api_key": if api_key { "ok" } else { "missing" },
                "tools": tools,
                "realtime_url": state.settings.realtime.url,
            }
        })),
    )
}
