//! Error types for stash.

use thiserror::Error;

use crate::storage::QuotaViolation;

/// Common error type for stash.
#[derive(Error, Debug)]
pub enum StashError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error from the blob store or the staging area.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for malformed input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing storage or entity reference.
    #[error("{0} not found")]
    NotFound(String),

    /// A storage limit would be breached by the requested write.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(QuotaViolation),

    /// Structurally invalid request (self-containment, duplicate sibling).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The tree metadata is inconsistent (cycle or runaway parent chain).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Zip archive writer error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for StashError {
    fn from(e: sqlx::Error) -> Self {
        StashError::Database(e.to_string())
    }
}

impl From<async_zip::error::ZipError> for StashError {
    fn from(e: async_zip::error::ZipError) -> Self {
        StashError::Archive(e.to_string())
    }
}

impl StashError {
    /// Whether this error should be shown to the client verbatim.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            StashError::NotFound(_)
                | StashError::QuotaExceeded(_)
                | StashError::InvalidOperation(_)
                | StashError::Validation(_)
                | StashError::Auth(_)
                | StashError::Permission(_)
        )
    }
}

/// Result type alias for stash operations.
pub type Result<T> = std::result::Result<T, StashError>;
