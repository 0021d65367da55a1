//! Prometheus metrics endpoint

use crate::state::HasAuthz;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// GET /metrics
pub async fn metrics_handler<S: HasAuthz>(State(state): State<S>) -> impl IntoResponse {
    match state.prometheus_handle() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "Metrics not enabled".to_string()),
    }
}
