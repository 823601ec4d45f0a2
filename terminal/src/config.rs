//! Configuration management for the terminal.

use std::env;
use till_engine::SyncWindows;

/// Default sync cadence when no setting has been persisted yet.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Terminal configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of this terminal/store, stamped on outgoing records
    pub store_id: String,
    /// SQLite connection URL
    pub database_url: String,
    /// Base URL of the remote store API
    pub remote_url: String,
    /// Bearer key for the remote store API
    pub api_key: Option<String>,
    /// Seed value for the persisted sync interval
    pub sync_interval_secs: u64,
    /// Conflict classification windows
    pub windows: SyncWindows,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_id = env::var("TILL_STORE_ID").unwrap_or_else(|_| "default-store".to_string());

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://till.db?mode=rwc".to_string());

        let remote_url = env::var("TILL_REMOTE_URL").map_err(|_| ConfigError::MissingRemoteUrl)?;

        let api_key = env::var("TILL_API_KEY").ok();

        let sync_interval_secs = match env::var("TILL_SYNC_INTERVAL_SECS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidInterval)?,
            Err(_) => DEFAULT_SYNC_INTERVAL_SECS,
        };

        let mut windows = SyncWindows::default();
        if let Ok(raw) = env::var("TILL_IDENTICAL_WINDOW_MS") {
            windows.identical_ms = raw.parse().map_err(|_| ConfigError::InvalidWindow)?;
        }
        if let Ok(raw) = env::var("TILL_NEAR_WINDOW_MS") {
            windows.near_ms = raw.parse().map_err(|_| ConfigError::InvalidWindow)?;
        }

        Ok(Self {
            store_id,
            database_url,
            remote_url,
            api_key,
            sync_interval_secs,
            windows,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TILL_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid TILL_SYNC_INTERVAL_SECS value")]
    InvalidInterval,

    #[error("Invalid conflict window value")]
    InvalidWindow,
}
