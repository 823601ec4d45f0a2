//! Till Terminal - offline-first sync runtime for POS terminals.
//!
//! Wires the deterministic `till-engine` core to the real world: a SQLite
//! local store, an HTTP remote store, the push/pull engines, the conflict
//! resolver, and the background scheduler that drives sync cycles.

pub mod config;
pub mod db;
pub mod error;
pub mod pull;
pub mod push;
pub mod remote;
pub mod resolver;
pub mod scheduler;

pub use config::{Config, ConfigError};
pub use error::{Result, SyncError};
pub use pull::PullEngine;
pub use push::PushEngine;
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore};
pub use resolver::{ConflictResolver, ManualAction, Resolution, Strategy};
pub use scheduler::{Direction, SyncScheduler, MIN_SYNC_INTERVAL_SECS};

/// Current wall-clock time as epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
