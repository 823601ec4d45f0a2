//! Unified error handling for the terminal sync runtime.

use thiserror::Error;

/// Application error type.
///
/// Record-level variants are recovered inside a batch (the record is
/// logged and retried on a later cycle); everything else aborts the cycle
/// and surfaces in the scheduler's stats.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store unreachable: {0}")]
    Connectivity(String),

    #[error("record transform failed: {0}")]
    Transform(String),

    #[error("remote write rejected: {0}")]
    WriteRejected(String),

    #[error("remote API error: {0}")]
    RemoteApi(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("engine error: {0}")]
    Engine(#[from] till_engine::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for product {0}")]
    InsufficientStock(String),

    #[error("a sync cycle is already running")]
    CycleInProgress,
}

impl SyncError {
    /// Whether this failure is isolated to a single record. Record-level
    /// failures never abort a batch; the record keeps its sync status and
    /// is retried on a later cycle.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            SyncError::Connectivity(_)
                | SyncError::Transform(_)
                | SyncError::WriteRejected(_)
                | SyncError::RemoteApi(_)
                | SyncError::NotFound(_)
                | SyncError::Engine(_)
        )
    }
}

/// Result type alias for the terminal.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_level_classification() {
        assert!(SyncError::Transform("bad shape".into()).is_record_level());
        assert!(SyncError::WriteRejected("409".into()).is_record_level());
        assert!(SyncError::NotFound("p1".into()).is_record_level());
        assert!(!SyncError::Database(sqlx::Error::PoolClosed).is_record_level());
        assert!(!SyncError::CycleInProgress.is_record_level());
        assert!(!SyncError::Validation("too small".into()).is_record_level());
    }

    #[test]
    fn error_display() {
        let err = SyncError::InsufficientStock("p1".into());
        assert_eq!(err.to_string(), "insufficient stock for product p1");
    }
}
