//! Health, liveness, and readiness endpoint handlers.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::GatewayState;
use crate::lifecycle::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` field tells whether the process is
/// actually serving.
pub async fn health_handler(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.lifecycle.health_state().as_str(),
        "in_flight": state.lifecycle.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "events_consumed": state.events_consumed.load(Ordering::Relaxed),
    }))
}

/// Liveness check. Always 200 while the process responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 when ready, 503 while starting, draining, or stopped.
pub async fn readiness_handler(State(state): State<GatewayState>) -> StatusCode {
    if state.lifecycle.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
