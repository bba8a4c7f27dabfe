//! Domain error model.

use thiserror::Error;

/// Result type used across the data model.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures while building requests
/// (validation, malformed identifiers). Transport and remote-service failures
/// belong to the layers that talk to them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. empty or badly formed).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An info type name does not follow the `UPPER_SNAKE` convention.
    #[error("invalid info type: {0}")]
    InvalidInfoType(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_info_type(msg: impl Into<String>) -> Self {
        Self::InvalidInfoType(msg.into())
    }
}
