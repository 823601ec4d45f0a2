//! Persisted terminal settings: the sync interval and the pull watermarks.

use crate::db::Pool;
use crate::error::Result;
use till_engine::{Timestamp, Watermarks};

pub const SYNC_INTERVAL_KEY: &str = "sync_interval";
pub const WATERMARKS_KEY: &str = "watermarks";

/// Read a setting value.
pub async fn get_setting(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Write a setting value, inserting or overwriting.
pub async fn set_setting(pool: &Pool, key: &str, value: &str, now: Timestamp) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// The persisted sync interval, if one has been stored.
pub async fn load_sync_interval(pool: &Pool) -> Result<Option<u64>> {
    let raw = get_setting(pool, SYNC_INTERVAL_KEY).await?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

/// Persist the sync interval.
pub async fn save_sync_interval(pool: &Pool, secs: u64, now: Timestamp) -> Result<()> {
    set_setting(pool, SYNC_INTERVAL_KEY, &secs.to_string(), now).await
}

/// The persisted pull watermarks. Corrupt or absent state degrades to
/// empty cursors, which re-pulls from the beginning rather than failing.
pub async fn load_watermarks(pool: &Pool) -> Result<Watermarks> {
    let raw = get_setting(pool, WATERMARKS_KEY).await?;
    match raw {
        Some(json) => match serde_json::from_str(&json) {
            Ok(marks) => Ok(marks),
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupt watermark state");
                Ok(Watermarks::new())
            }
        },
        None => Ok(Watermarks::new()),
    }
}

/// Persist the pull watermarks.
pub async fn save_watermarks(pool: &Pool, marks: &Watermarks, now: Timestamp) -> Result<()> {
    let json = serde_json::to_string(marks).unwrap_or_default();
    set_setting(pool, WATERMARKS_KEY, &json, now).await
}
