//! Pull engine: absorbs remote changes since each table's watermark.

use crate::db::{self, changelog, Pool};
use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;
use serde::Serialize;
use std::sync::Arc;
use till_engine::{
    classify, Conflict, ConflictDetail, Disposition, EntityKind, EntryStatus, RecordData,
    SyncOperation, SyncReport, SyncStatus, SyncWindows, TableReport, Timestamp, Watermarks,
};

/// Per-table counts of changes waiting on the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteChanges {
    pub products: u64,
    pub sales: u64,
    pub stock_movements: u64,
    pub total: u64,
}

/// What happened to one remote record during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullOutcome {
    Created,
    Updated,
    /// Same content on both sides
    Identical,
    /// Local copy is newer; left pending for the next push
    LocalNewer,
    /// Immutable rows already present are never touched
    SkippedImmutable,
    Conflicted,
}

/// Reconciles remote changes into the local store, flagging conflicts
/// into the change-log inbox.
pub struct PullEngine<R> {
    pool: Pool,
    remote: Arc<R>,
    windows: SyncWindows,
}

impl<R: RemoteStore> PullEngine<R> {
    pub fn new(pool: Pool, remote: Arc<R>, windows: SyncWindows) -> Self {
        Self {
            pool,
            remote,
            windows,
        }
    }

    /// Pull every table's changes since its watermark. Watermarks advance
    /// per table, only after that table's batch completes.
    pub async fn pull_all(&self, marks: &mut Watermarks) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for kind in EntityKind::ALL {
            match self.pull_kind(kind, marks).await {
                Ok(table) => {
                    report.insert(kind, table);
                }
                Err(e) => {
                    changelog::record(
                        &self.pool,
                        SyncOperation::Pull,
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
            SyncOperation::Pull,
            None,
            None,
            EntryStatus::Success,
            None,
        )
        .await;
        tracing::debug!(
            success = report.total_success(),
            failed = report.total_failed(),
            conflicts = report.total_conflicts(),
            "pull batch finished"
        );
        Ok(report)
    }

    async fn pull_kind(&self, kind: EntityKind, marks: &mut Watermarks) -> Result<TableReport> {
        let since = marks.get(kind);
        let remote_records = self.remote.list_since(kind, since).await?;

        let mut report = TableReport::default();
        let mut high_water: Option<Timestamp> = None;

        for remote_record in remote_records {
            high_water = Some(high_water.map_or(remote_record.updated_at, |current| {
                current.max(remote_record.updated_at)
            }));

            let id = remote_record.id.clone();
            match self.apply_remote(kind, &remote_record).await {
                Ok(outcome) => {
                    match outcome {
                        PullOutcome::Created | PullOutcome::Updated => report.record_success(),
                        PullOutcome::Conflicted => report.record_conflict(),
                        PullOutcome::Identical
                        | PullOutcome::LocalNewer
                        | PullOutcome::SkippedImmutable => {}
                    }
                    if outcome != PullOutcome::Conflicted {
                        changelog::record(
                            &self.pool,
                            SyncOperation::Pull,
                            Some(kind),
                            Some(id.as_str()),
                            EntryStatus::Success,
                            None,
                        )
                        .await;
                    }
                }
                Err(e) if e.is_record_level() => {
                    tracing::warn!(kind = %kind, id = %id, error = %e, "pull failed for record");
                    report.record_failure(&id, e.to_string());
                    changelog::record(
                        &self.pool,
                        SyncOperation::Pull,
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

        if let Some(high_water) = high_water {
            marks.advance(kind, high_water);
        }
        Ok(report)
    }

    /// Reconcile one remote record against the local store.
    async fn apply_remote(&self, kind: EntityKind, remote: &RecordData) -> Result<PullOutcome> {
        let Some(local) = db::record_data(&self.pool, kind, &remote.id).await? else {
            db::create_record(&self.pool, kind, remote, SyncStatus::Synced).await?;
            if kind.has_line_items() {
                self.pull_sale_items(&remote.id).await?;
            }
            return Ok(PullOutcome::Created);
        };

        if kind.is_immutable() {
            return Ok(PullOutcome::SkippedImmutable);
        }

        match classify(kind, &local, remote, self.windows) {
            Disposition::Identical => Ok(PullOutcome::Identical),
            Disposition::LocalNewer => Ok(PullOutcome::LocalNewer),
            Disposition::RemoteNewer => {
                db::update_record_fields(&self.pool, kind, remote, SyncStatus::Synced).await?;
                if kind.has_line_items() {
                    self.pull_sale_items(&remote.id).await?;
                }
                Ok(PullOutcome::Updated)
            }
            Disposition::Conflict(conflict) => {
                self.flag_conflict(&conflict).await?;
                Ok(PullOutcome::Conflicted)
            }
        }
    }

    /// Replace a sale's local line items with the remote set.
    async fn pull_sale_items(&self, sale_id: &str) -> Result<()> {
        let items = self.remote.list_sale_items(sale_id).await?;
        db::sales::replace_sale_items(&self.pool, sale_id, &items).await
    }

    /// Park a conflict: tag the local record and persist the full detail
    /// as an unresolved change-log entry.
    async fn flag_conflict(&self, conflict: &Conflict) -> Result<()> {
        db::set_record_sync_status(
            &self.pool,
            conflict.kind,
            &conflict.record_id,
            SyncStatus::Conflict,
        )
        .await?;

        let detail = ConflictDetail::from_conflict(conflict);
        changelog::record(
            &self.pool,
            SyncOperation::Conflict,
            Some(conflict.kind),
            Some(conflict.record_id.as_str()),
            EntryStatus::Conflict,
            Some(detail.to_json()),
        )
        .await;

        tracing::info!(
            kind = %conflict.kind,
            id = %conflict.record_id,
            severity = %conflict.severity,
            "conflict detected and parked for resolution"
        );
        Ok(())
    }

    /// Pull exactly one record by id, overwriting the local copy (create
    /// if missing). Immutable kinds are never overwritten.
    pub async fn force_pull_record(&self, kind: EntityKind, id: &str) -> Result<()> {
        let fetched = self.remote.get_by_id(kind, id).await;
        let remote = match fetched {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                let e = SyncError::NotFound(format!("remote {kind} record {id}"));
                changelog::record(
                    &self.pool,
                    SyncOperation::Pull,
                    Some(kind),
                    Some(id),
                    EntryStatus::Error,
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
            Err(e) => {
                changelog::record(
                    &self.pool,
                    SyncOperation::Pull,
                    Some(kind),
                    Some(id),
                    EntryStatus::Error,
                    Some(e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        match db::record_data(&self.pool, kind, id).await? {
            Some(_) if kind.is_immutable() => {}
            Some(_) => {
                db::update_record_fields(&self.pool, kind, &remote, SyncStatus::Synced).await?;
            }
            None => {
                db::create_record(&self.pool, kind, &remote, SyncStatus::Synced).await?;
            }
        }
        if kind.has_line_items() {
            self.pull_sale_items(id).await?;
        }

        changelog::record(
            &self.pool,
            SyncOperation::Pull,
            Some(kind),
            Some(id),
            EntryStatus::Success,
            None,
        )
        .await;
        Ok(())
    }

    /// How many remote changes are waiting past each watermark.
    pub async fn remote_changes_count(&self, marks: &Watermarks) -> Result<RemoteChanges> {
        let (products, sales, stock_movements) = futures::try_join!(
            self.remote
                .count_since(EntityKind::Product, marks.get(EntityKind::Product)),
            self.remote
                .count_since(EntityKind::Sale, marks.get(EntityKind::Sale)),
            self.remote.count_since(
                EntityKind::StockMovement,
                marks.get(EntityKind::StockMovement)
            ),
        )?;
        Ok(RemoteChanges {
            products,
            sales,
            stock_movements,
            total: products + sales + stock_movements,
        })
    }
}
