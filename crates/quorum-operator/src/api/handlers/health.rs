//! Health handler

use crate::api::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let status = if state.ctx.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };
    Json(HealthCheckResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}
