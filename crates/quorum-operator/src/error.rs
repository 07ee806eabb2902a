//! Error types for quorum-operator

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quorum_autoscale::MetricsError;
use quorum_formation::FormationError;
use quorum_store::{ApplyError, StoreError};
use quorum_template::TemplateError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("server error: {0}")]
    Server(String),

    /// Metrics registry error
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics source setup error
    #[error("metrics source error: {0}")]
    MetricsSource(#[from] MetricsError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end one reconcile cycle.
///
/// None of these is fatal to the daemon; the scheduler logs them and the
/// next sweep starts from scratch.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("formation error: {0}")]
    Formation(#[from] FormationError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// A group that already took part in quorum was given a different role
    #[error("group {group} cannot change role from {from} to {to} after joining quorum")]
    RoleReassignment { group: String, from: String, to: String },

    #[error("reconcile deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    #[error("reconcile cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Whether the next cycle may succeed without any change to the inputs
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Apply(e) => e.is_transient(),
            Self::Store(e) => e.is_conflict() || matches!(e, StoreError::Storage(_)),
            Self::DeadlineExceeded(_) | Self::Cancelled => true,
            Self::ClusterNotFound(_)
            | Self::Formation(_)
            | Self::Template(_)
            | Self::RoleReassignment { .. } => false,
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for one reconcile cycle
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Result type alias for daemon operations
pub type OperatorResult<T> = Result<T, OperatorError>;
