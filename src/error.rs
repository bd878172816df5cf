//! Error types for dropgate.

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Exit code for a successful session.
pub const EXIT_OK: i32 = 0;

/// Exit code for internal or protocol failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for usage and storage errors.
pub const EXIT_USAGE: i32 = 2;

/// Failure to resolve a token to servable bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No record exists for the token.
    #[error("token not found")]
    NotFound,

    /// The record exists but its expiry has passed.
    #[error("token expired")]
    Expired,

    /// The record exists but its backing file is gone.
    #[error("file missing on disk")]
    Missing,
}

/// Common error type for dropgate.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Wire protocol failure (malformed record, bad ack, premature end of stream).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid invocation, detected before any protocol exchange.
    #[error("usage error: {0}")]
    Usage(String),

    /// Token lookup failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Database error.
    ///
    /// Errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Invalid data rejected before it reaches the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            GatewayError::Usage(_) | GatewayError::Storage(_) => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Database(e.to_string())
    }
}

/// Result type alias for dropgate operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
