//! Prometheus exposition

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

/// Operator metrics in Prometheus text format
pub async fn export_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state
        .ctx
        .metrics()
        .export()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
