//! Change-log persistence: the append-only audit trail and conflict inbox.

use crate::db::Pool;
use crate::error::Result;
use crate::now_ms;
use sqlx::Row;
use till_engine::{ChangeLogEntry, EntityKind, EntryStatus, SyncOperation, Timestamp};
use uuid::Uuid;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug)]
struct LogRow {
    id: String,
    operation: String,
    table_name: Option<String>,
    record_id: Option<String>,
    status: String,
    detail: Option<String>,
    created_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for LogRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(LogRow {
            id: row.try_get("id")?,
            operation: row.try_get("operation")?,
            table_name: row.try_get("table_name")?,
            record_id: row.try_get("record_id")?,
            status: row.try_get("status")?,
            detail: row.try_get("detail")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl LogRow {
    fn to_entry(&self) -> Result<ChangeLogEntry> {
        let kind = match &self.table_name {
            Some(name) => Some(EntityKind::from_table_name(name)?),
            None => None,
        };
        Ok(ChangeLogEntry::new(
            &self.id,
            SyncOperation::parse(&self.operation)?,
            kind,
            self.record_id.clone(),
            EntryStatus::parse(&self.status)?,
            self.detail.clone(),
            self.created_at,
        ))
    }
}

const SELECT_COLUMNS: &str = "id, operation, table_name, record_id, status, detail, created_at";

/// Build a new entry with a fresh id and the current wall-clock time.
pub fn new_entry(
    operation: SyncOperation,
    kind: Option<EntityKind>,
    record_id: Option<&str>,
    status: EntryStatus,
    detail: Option<String>,
) -> ChangeLogEntry {
    ChangeLogEntry::new(
        Uuid::new_v4().to_string(),
        operation,
        kind,
        record_id.map(str::to_string),
        status,
        detail,
        now_ms(),
    )
}

/// Append an entry to the log.
pub async fn append(pool: &Pool, entry: &ChangeLogEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_log (id, operation, table_name, record_id, status, detail, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(entry.operation.as_str())
    .bind(entry.kind.map(EntityKind::table_name))
    .bind(&entry.record_id)
    .bind(entry.status.as_str())
    .bind(&entry.detail)
    .bind(entry.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Append an entry, logging instead of propagating a failure. Telemetry
/// must never turn a record outcome into an error.
pub async fn record(
    pool: &Pool,
    operation: SyncOperation,
    kind: Option<EntityKind>,
    record_id: Option<&str>,
    status: EntryStatus,
    detail: Option<String>,
) {
    let entry = new_entry(operation, kind, record_id, status, detail);
    if let Err(e) = append(pool, &entry).await {
        tracing::warn!(error = %e, "failed to append sync log entry");
    }
}

/// Most recent entries first.
pub async fn list_recent(pool: &Pool, limit: i64) -> Result<Vec<ChangeLogEntry>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM sync_log ORDER BY created_at DESC, id DESC LIMIT ?"
    );
    let rows: Vec<LogRow> = sqlx::query_as(&query).bind(limit).fetch_all(pool).await?;
    rows.iter().map(LogRow::to_entry).collect()
}

/// Fetch one entry by id.
pub async fn get_entry(pool: &Pool, id: &str) -> Result<Option<ChangeLogEntry>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM sync_log WHERE id = ?");
    let row: Option<LogRow> = sqlx::query_as(&query).bind(id).fetch_optional(pool).await?;
    match row {
        Some(row) => Ok(Some(row.to_entry()?)),
        None => Ok(None),
    }
}

/// The conflict inbox: conflict entries not yet resolved, newest first.
pub async fn list_unresolved_conflicts(pool: &Pool) -> Result<Vec<ChangeLogEntry>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM sync_log \
         WHERE operation = 'conflict' AND status = 'conflict' \
         ORDER BY created_at DESC, id DESC"
    );
    let rows: Vec<LogRow> = sqlx::query_as(&query).fetch_all(pool).await?;
    rows.iter().map(LogRow::to_entry).collect()
}

/// Close a conflict entry as resolved or auto-resolved.
pub async fn mark_resolved(pool: &Pool, id: &str, status: EntryStatus) -> Result<()> {
    sqlx::query("UPDATE sync_log SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete entries older than the given number of days. Returns how many
/// rows were removed.
pub async fn purge_older_than(pool: &Pool, days: i64, now: Timestamp) -> Result<u64> {
    let cutoff = now - days * MS_PER_DAY;
    let result = sqlx::query("DELETE FROM sync_log WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// When the given operation last completed successfully, if ever.
pub async fn last_success_time(
    pool: &Pool,
    operation: SyncOperation,
) -> Result<Option<Timestamp>> {
    let time: Option<i64> = sqlx::query_scalar(
        "SELECT created_at FROM sync_log WHERE operation = ? AND status = 'success' \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(operation.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(time)
}

/// Records whose push failed within the window, for retry.
pub async fn recent_push_errors(
    pool: &Pool,
    window_hours: i64,
    now: Timestamp,
) -> Result<Vec<(EntityKind, String)>> {
    let cutoff = now - window_hours * 3_600_000;
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT DISTINCT table_name, record_id FROM sync_log \
         WHERE operation = 'push' AND status = 'error' \
           AND table_name IS NOT NULL AND record_id IS NOT NULL \
           AND created_at > ?",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut targets = Vec::with_capacity(rows.len());
    for (table, record_id) in rows {
        targets.push((EntityKind::from_table_name(&table)?, record_id));
    }
    Ok(targets)
}

/// One per-day, per-operation, per-status tally.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DailyCount {
    pub date: String,
    pub operation: String,
    pub status: String,
    pub count: i64,
}

/// Sync activity grouped by day over the trailing window.
pub async fn statistics(pool: &Pool, days: i64, now: Timestamp) -> Result<Vec<DailyCount>> {
    let cutoff = now - days * MS_PER_DAY;
    let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
        "SELECT date(created_at / 1000, 'unixepoch') AS day, operation, status, COUNT(*) \
         FROM sync_log WHERE created_at >= ? \
         GROUP BY day, operation, status \
         ORDER BY day DESC, operation, status",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(date, operation, status, count)| DailyCount {
            date,
            operation,
            status,
            count,
        })
        .collect())
}
