//! Unified error types for hazardmap.
//!
//! Display strings carry a stable code prefix so they can be matched in logs
//! and mapped onto JSON-RPC error codes.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for the hazardmap core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Latitude or longitude outside the valid range.
    #[error("INVALID_COORDINATE: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// Geohash precision outside [1, 12].
    #[error("INVALID_COORDINATE: precision {0} not in 1..=12")]
    InvalidPrecision(usize),

    /// Malformed geohash string.
    #[error("INVALID_GEOHASH: {0}")]
    InvalidGeohash(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Persistent storage operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Payload (de)serialization failed.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the caller may retry the operation unchanged.
    ///
    /// Only storage-layer failures qualify; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Storage(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Storage(tokio_rusqlite::Error::Close(c)),
            _ => Error::Storage(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Storage(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidCoordinate { .. } | Error::InvalidPrecision(_) => -32602,
            Error::InvalidGeohash(_) => -32602,
            Error::InvalidInput(_) => -32602,
            Error::Storage(_) | Error::MigrationFailed(_) => -32002,
            Error::Serialization(_) => -32003,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
