//! File manager error taxonomy.

use thiserror::Error;

/// Boxed error used to carry connector failures through unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using `FmError`.
pub type FmResult<T> = Result<T, FmError>;

/// Errors surfaced by file manager operations.
#[derive(Debug, Error)]
pub enum FmError {
    /// A file, variant, link, or storage object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request is malformed or conflicts with the current state.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload policy or bucket preset rejected the request.
    #[error("Policy violation: {0}")]
    Policy(String),

    /// Caller lacks the privilege the operation requires.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Storage backend failed or lacks a required capability.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persistence layer failure, propagated as-is.
    #[error("Connector error: {0}")]
    Connector(#[source] BoxError),
}

impl FmError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a policy error.
    #[must_use]
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create an authorization error.
    #[must_use]
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Wrap a persistence failure.
    #[must_use]
    pub fn connector(err: impl Into<BoxError>) -> Self {
        Self::Connector(err.into())
    }

    /// Returns the HTTP status code a transport layer should map this error to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Policy(_) => 422,
            Self::Authorization(_) => 403,
            Self::Storage(_) => 502,
            Self::Connector(_) => 500,
        }
    }

    /// Returns the stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Policy(_) => "POLICY_VIOLATION",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Connector(_) => "CONNECTOR_ERROR",
        }
    }
}
