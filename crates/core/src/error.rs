//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unrecognized payload: {0}")]
    UnrecognizedPayload(String),

    #[error("payload size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("bundle has {count} signatures, exceeds maximum allowed ({max})")]
    TooManySignatures { count: usize, max: usize },

    #[error("payload value is less than the required length: {0}")]
    EmptyPayload(String),

    #[error("signature {index}: sig value is less than the required length")]
    EmptySignature { index: usize },

    #[error("signatures value is less than the required length")]
    MissingSignatures,

    #[error("malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("invalid gitoid: {0}")]
    InvalidGitoid(String),

    #[error("invalid base64 in {field}: {reason}")]
    InvalidBase64 { field: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error describes a caller-supplied payload that was rejected
    /// (as opposed to an internal or configuration failure).
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::MalformedTimestamp(_))
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
