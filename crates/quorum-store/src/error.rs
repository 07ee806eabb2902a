//! Error types for quorum-store.

use quorum_types::VersionToken;
use thiserror::Error;

/// Errors returned by a versioned store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No object stored under the key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Create raced with another writer.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// Write carried a stale version token.
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: VersionToken,
        actual: VersionToken,
    },

    /// Backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// The write lost a race and may succeed against a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by the conflict-safe applier.
#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// Every attempt hit a conflict before the retry bound.
    #[error("apply to {key} exhausted after {attempts} attempts ({elapsed_ms}ms)")]
    Exhausted {
        key: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    /// Non-conflict store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApplyError {
    /// Transient errors are retried by the next scheduled reconcile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Store(StoreError::Storage(_)))
    }
}

/// Result type for applier operations.
pub type ApplyResult<T> = std::result::Result<T, ApplyError>;
