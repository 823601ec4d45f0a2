//! Push engine: announces local pending changes to the remote store.

use crate::db::{self, changelog, Pool};
use crate::error::{Result, SyncError};
use crate::now_ms;
use crate::remote::RemoteStore;
use std::sync::Arc;
use till_engine::{EntityKind, EntryStatus, RecordData, SyncOperation, SyncReport, TableReport};

/// Pushes records with sync status `pending` or `conflict` to the remote
/// store as idempotent upserts. A single record's failure never aborts a
/// batch.
pub struct PushEngine<R> {
    pool: Pool,
    remote: Arc<R>,
}

impl<R: RemoteStore> PushEngine<R> {
    pub fn new(pool: Pool, remote: Arc<R>) -> Self {
        Self { pool, remote }
    }

    /// Whether the remote store is currently reachable.
    pub async fn check_connectivity(&self) -> bool {
        self.remote.is_reachable().await
    }

    /// Push every pending record across all tables.
    pub async fn push_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for kind in EntityKind::ALL {
            match self.push_kind(kind).await {
                Ok(table) => {
                    report.insert(kind, table);
                }
                Err(e) => {
                    changelog::record(
                        &self.pool,
                        SyncOperation::Push,
                        Some(kind),
                        None,
                        EntryStatus::Error,
                        Some(e.to_string()),
                    )
                    .await;
                    return Err(e);
                }
            }
        }

        changelog::record(
            &self.pool,
            SyncOperation::Push,
            None,
            None,
            EntryStatus::Success,
            None,
        )
        .await;
        tracing::debug!(
            success = report.total_success(),
            failed = report.total_failed(),
            "push batch finished"
        );
        Ok(report)
    }

    async fn push_kind(&self, kind: EntityKind) -> Result<TableReport> {
        let pending = db::list_pending_records(&self.pool, kind).await?;
        let mut report = TableReport::default();

        for record in pending {
            let id = record.id.clone();
            match self.push_one(kind, &record).await {
                Ok(()) => {
                    report.record_success();
                    changelog::record(
                        &self.pool,
                        SyncOperation::Push,
                        Some(kind),
                        Some(id.as_str()),
                        EntryStatus::Success,
                        None,
                    )
                    .await;
                }
                Err(e) if e.is_record_level() => {
                    tracing::warn!(kind = %kind, id = %id, error = %e, "push failed for record");
                    report.record_failure(&id, e.to_string());
                    changelog::record(
                        &self.pool,
                        SyncOperation::Push,
                        Some(kind),
                        Some(id.as_str()),
                        EntryStatus::Error,
                        Some(e.to_string()),
                    )
                    .await;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Push one record: upsert remotely, then mark synced locally. Sales
    /// push their line items right after the parent row.
    async fn push_one(&self, kind: EntityKind, record: &RecordData) -> Result<()> {
        self.remote.upsert(kind, record).await?;

        if kind.has_line_items() {
            let items = db::sales::list_sale_item_records(&self.pool, &record.id).await?;
            self.remote.upsert_sale_items(&record.id, &items).await?;
        }

        db::mark_record_synced(&self.pool, kind, &record.id).await
    }

    /// Push exactly one record, regardless of its sync status. Used by
    /// retry and manual-intervention flows.
    pub async fn force_push_record(&self, kind: EntityKind, id: &str) -> Result<()> {
        let record = db::record_data(&self.pool, kind, id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{kind} record {id}")))?;

        match self.push_one(kind, &record).await {
            Ok(()) => {
                changelog::record(
                    &self.pool,
                    SyncOperation::Push,
                    Some(kind),
                    Some(id),
                    EntryStatus::Success,
                    None,
                )
                .await;
                Ok(())
            }
            Err(e) => {
                changelog::record(
                    &self.pool,
                    SyncOperation::Push,
                    Some(kind),
                    Some(id),
                    EntryStatus::Error,
                    Some(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Re-push every record whose push failed within the trailing window.
    /// Returns `(succeeded, failed)` counts.
    pub async fn retry_failed(&self, window_hours: i64) -> Result<(u32, u32)> {
        let targets = changelog::recent_push_errors(&self.pool, window_hours, now_ms()).await?;
        let mut succeeded = 0;
        let mut failed = 0;

        for (kind, id) in targets {
            match self.force_push_record(kind, &id).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    tracing::debug!(kind = %kind, id = %id, error = %e, "retry push failed");
                    failed += 1;
                }
            }
        }

        Ok((succeeded, failed))
    }
}
