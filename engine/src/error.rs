//! Error types for the Till engine.

use thiserror::Error;

/// All possible errors from the Till engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown entity table: {0}")]
    UnknownTable(String),

    #[error("invalid sync status: {0}")]
    InvalidSyncStatus(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("malformed conflict detail: {0}")]
    MalformedDetail(String),

    #[error("unknown {what}: {value}")]
    UnknownValue { what: &'static str, value: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
