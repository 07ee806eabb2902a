//! Error types for quorum-template.

use thiserror::Error;

/// Errors raised while rendering a member template.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// Member group not declared in desired state.
    #[error("member group not found: {0}")]
    GroupNotFound(String),

    /// Engine configuration key cannot be rendered.
    #[error("invalid engine configuration key: {0:?}")]
    InvalidConfigKey(String),
}

/// Result type for template operations.
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;
