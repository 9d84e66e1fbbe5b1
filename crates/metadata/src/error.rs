//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The unique gitoid constraint fired: the envelope is already stored.
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid payload: {0}")]
    Payload(#[from] archivista_core::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported sql store backend: {0}")]
    UnsupportedBackend(String),

    #[error("rds iam error: {0}")]
    Iam(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl MetadataError {
    /// Whether this error reports an already-stored envelope.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Whether a database error is a unique-constraint violation.
///
/// Postgres reports SQLSTATE 23505, MySQL error 1062, SQLite a message
/// starting with "UNIQUE constraint failed".
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    if db_err.is_unique_violation() {
        return true;
    }
    matches!(db_err.code().as_deref(), Some("23505") | Some("1062"))
        || db_err.message().contains("UNIQUE constraint")
        || db_err.message().contains("Duplicate entry")
}
