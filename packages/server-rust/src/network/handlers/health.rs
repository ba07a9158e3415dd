//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::HealthState;

/// Detailed health as JSON.
///
/// Always 200; the `state` field tells whether the server is serving or
/// draining.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let health = state.shutdown.health_state();
    let pool = state.services.pool.stats();

    Json(json!({
        "state": health.as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "clusters": pool.clusters,
        "cordoned_clusters": pool.cordoned,
        "pooled_connections": pool.connections,
    }))
}

/// Liveness check: 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 only in the `Ready` state.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
