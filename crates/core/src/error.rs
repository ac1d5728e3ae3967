//! Unified error types for bibcache.
//!
//! Display strings start with a stable upper-case code so operators can grep
//! logs and tool responses for a failure class.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the record cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `enable()` called while the cache is already enabled.
    #[error("ALREADY_ENABLED: record cache is already enabled")]
    AlreadyEnabled,

    /// `disable()` called while the cache is already disabled.
    #[error("ALREADY_DISABLED: record cache is already disabled")]
    AlreadyDisabled,

    /// Invalid input parameters (e.g., a record detail that doesn't match its kind).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A composite record key could not be parsed.
    #[error("INVALID_KEY: {0}")]
    InvalidKey(String),

    /// The requested entity does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// The description renderer rejected a record.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded.
    #[error("CACHE_ERROR: corrupt value: {0}")]
    Corrupt(String),

    /// A background task panicked or was cancelled while it was being awaited.
    #[error("TASK_FAILED: {0}")]
    TaskFailed(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidKey(msg) => (-32602, msg.clone()),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Corrupt(msg) => (-32002, msg.clone()),
            Error::RenderFailed(msg) => (-32003, msg.clone()),
            Error::TaskFailed(msg) => (-32004, msg.clone()),
            Error::AlreadyEnabled => (-32010, "Record cache is already enabled".to_string()),
            Error::AlreadyDisabled => (-32011, "Record cache is already disabled".to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
