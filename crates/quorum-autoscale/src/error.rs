//! Error types for quorum-autoscale.
//!
//! None of these abort a reconcile: the collector substitutes a fallback
//! value for any failed query.

use thiserror::Error;

/// Errors from an external metrics source.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Request exceeded the configured timeout.
    #[error("metrics query timed out after {0}ms")]
    Timeout(u64),

    /// Transport failure.
    #[error("metrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success HTTP status.
    #[error("metrics backend returned status {0}")]
    BadStatus(u16),

    /// Backend reported a query error.
    #[error("metrics query failed: {0}")]
    Query(String),

    /// Response could not be interpreted as a scalar.
    #[error("unexpected metrics response: {0}")]
    Parse(String),

    /// Query matched no series.
    #[error("metrics query returned no samples")]
    EmptyResult,
}

/// Result type for metrics operations.
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;
