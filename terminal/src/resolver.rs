//! Conflict resolution: strategies over detected conflicts, the manual
//! inbox surface, and the automatic low-severity pass.

use crate::db::{self, changelog, Pool};
use crate::error::{Result, SyncError};
use crate::now_ms;
use crate::remote::RemoteStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use till_engine::{
    diff_records, merge_fields, severity, ChangeLogEntry, Conflict, ConflictDetail, EntityKind,
    EntryStatus, Impact, RecordData, RecordError, SyncOperation, SyncStatus,
};

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Newer `updated_at` wins wholesale
    Latest,
    /// Keep local values; the next push overwrites the remote
    Local,
    /// Take remote values
    Remote,
    /// Field-by-field, type-aware combination
    Merge,
    /// Park for operator review; nothing is mutated
    Manual,
}

/// Operator decision on a parked conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    KeepLocal,
    KeepRemote,
    Merge,
}

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    LocalWins,
    RemoteWins,
    Merged,
    /// Parked in the manual queue
    ManualQueued,
    /// Both sides had already converged by resolution time
    Converged,
}

/// A parked conflict with its parsed detail.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedConflict {
    pub entry: ChangeLogEntry,
    pub detail: ConflictDetail,
}

/// Outcome of a bulk resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvePassReport {
    pub resolved: u32,
    pub failed: u32,
    pub errors: Vec<RecordError>,
}

/// Unresolved-conflict tallies for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindConflictStats {
    pub kind: EntityKind,
    pub total: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Applies resolution strategies and manages the conflict inbox.
pub struct ConflictResolver<R> {
    pool: Pool,
    remote: Arc<R>,
}

impl<R: RemoteStore> ConflictResolver<R> {
    pub fn new(pool: Pool, remote: Arc<R>) -> Self {
        Self { pool, remote }
    }

    /// Apply a strategy to a detected conflict.
    pub async fn resolve_conflict(
        &self,
        conflict: &Conflict,
        strategy: Strategy,
    ) -> Result<Resolution> {
        match strategy {
            Strategy::Latest => {
                if conflict.local.updated_at > conflict.remote.updated_at {
                    self.keep_local(conflict.kind, &conflict.record_id).await
                } else {
                    self.take_remote(conflict.kind, &conflict.remote).await
                }
            }
            Strategy::Local => self.keep_local(conflict.kind, &conflict.record_id).await,
            Strategy::Remote => self.take_remote(conflict.kind, &conflict.remote).await,
            Strategy::Merge => {
                let merged = merge_fields(
                    &conflict.local,
                    &conflict.remote,
                    &conflict.differences,
                    now_ms(),
                );
                db::update_record_fields(&self.pool, conflict.kind, &merged, SyncStatus::Pending)
                    .await?;
                Ok(Resolution::Merged)
            }
            Strategy::Manual => {
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
                Ok(Resolution::ManualQueued)
            }
        }
    }

    /// Local wins: mark pending with a fresh `updated_at` so the next
    /// push overwrites the remote copy.
    async fn keep_local(&self, kind: EntityKind, id: &str) -> Result<Resolution> {
        db::touch_record_sync_status(&self.pool, kind, id, SyncStatus::Pending, now_ms()).await?;
        Ok(Resolution::LocalWins)
    }

    /// Remote wins: overwrite the local copy and mark it synced.
    /// Immutable kinds are left as they are.
    async fn take_remote(&self, kind: EntityKind, remote: &RecordData) -> Result<Resolution> {
        if kind.is_immutable() {
            db::set_record_sync_status(&self.pool, kind, &remote.id, SyncStatus::Synced).await?;
            return Ok(Resolution::RemoteWins);
        }
        match db::update_record_fields(&self.pool, kind, remote, SyncStatus::Synced).await {
            Ok(()) => Ok(Resolution::RemoteWins),
            Err(SyncError::NotFound(_)) => {
                db::create_record(&self.pool, kind, remote, SyncStatus::Synced).await?;
                Ok(Resolution::RemoteWins)
            }
            Err(e) => Err(e),
        }
    }

    /// The manual queue: parked conflicts with parseable detail, newest
    /// first. Entries with corrupt detail are logged and skipped.
    pub async fn list_unresolved(&self) -> Result<Vec<UnresolvedConflict>> {
        let entries = changelog::list_unresolved_conflicts(&self.pool).await?;
        let mut unresolved = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.conflict_detail() {
                Ok(detail) => unresolved.push(UnresolvedConflict { entry, detail }),
                Err(e) => {
                    tracing::warn!(entry = %entry.id, error = %e, "skipping unreadable conflict entry");
                }
            }
        }
        Ok(unresolved)
    }

    /// Settle one parked conflict. Both sides are re-fetched so the
    /// strategy acts on current data, then the entry is closed.
    pub async fn resolve_entry(
        &self,
        entry_id: &str,
        strategy: Strategy,
        closed_as: EntryStatus,
    ) -> Result<Resolution> {
        if strategy == Strategy::Manual {
            return Err(SyncError::Validation(
                "an inbox entry cannot be re-queued for manual resolution".to_string(),
            ));
        }
        if !matches!(closed_as, EntryStatus::Resolved | EntryStatus::AutoResolved) {
            return Err(SyncError::Validation(format!(
                "a conflict entry cannot be closed as '{}'",
                closed_as.as_str()
            )));
        }

        let entry = changelog::get_entry(&self.pool, entry_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("conflict entry {entry_id}")))?;
        if entry.operation != SyncOperation::Conflict || entry.status != EntryStatus::Conflict {
            return Err(SyncError::Validation(format!(
                "entry {entry_id} is not an unresolved conflict"
            )));
        }
        let kind = entry.kind.ok_or_else(|| {
            SyncError::Validation(format!("conflict entry {entry_id} has no table"))
        })?;
        let record_id = entry.record_id.clone().ok_or_else(|| {
            SyncError::Validation(format!("conflict entry {entry_id} has no record id"))
        })?;
        let stored_detail = entry.conflict_detail()?;

        let resolution = self
            .resolve_fresh(kind, &record_id, &stored_detail, strategy)
            .await?;
        changelog::mark_resolved(&self.pool, entry_id, closed_as).await?;

        tracing::info!(
            entry = %entry_id,
            kind = %kind,
            id = %record_id,
            resolution = ?resolution,
            "conflict resolved"
        );
        Ok(resolution)
    }

    /// Re-fetch both copies and apply the strategy to what is actually
    /// there now.
    async fn resolve_fresh(
        &self,
        kind: EntityKind,
        record_id: &str,
        stored: &ConflictDetail,
        strategy: Strategy,
    ) -> Result<Resolution> {
        let local = db::record_data(&self.pool, kind, record_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{kind} record {record_id}")))?;

        let Some(remote) = self.remote.get_by_id(kind, record_id).await? else {
            // Remote copy vanished; ours is the only one left
            return self.keep_local(kind, record_id).await;
        };

        let differences = diff_records(kind, &local, &remote);
        if differences.is_empty() {
            db::mark_record_synced(&self.pool, kind, record_id).await?;
            return Ok(Resolution::Converged);
        }

        let conflict = Conflict {
            kind,
            record_id: record_id.to_string(),
            conflict_type: stored.conflict_type,
            severity: severity(&differences),
            differences,
            local,
            remote,
        };
        self.resolve_conflict(&conflict, strategy).await
    }

    /// Settle an inbox entry with an operator decision.
    pub async fn resolve_manually(
        &self,
        entry_id: &str,
        action: ManualAction,
    ) -> Result<Resolution> {
        let strategy = match action {
            ManualAction::KeepLocal => Strategy::Local,
            ManualAction::KeepRemote => Strategy::Remote,
            ManualAction::Merge => Strategy::Merge,
        };
        self.resolve_entry(entry_id, strategy, EntryStatus::Resolved)
            .await
    }

    /// The post-cycle pass: settle every low-severity parked conflict
    /// with the `latest` strategy.
    pub async fn auto_resolve_low_severity(&self) -> Result<ResolvePassReport> {
        let mut report = ResolvePassReport::default();
        for unresolved in self.list_unresolved().await? {
            if unresolved.detail.severity != Impact::Low {
                continue;
            }
            match self
                .resolve_entry(&unresolved.entry.id, Strategy::Latest, EntryStatus::AutoResolved)
                .await
            {
                Ok(_) => report.resolved += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(RecordError {
                        id: unresolved.entry.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.resolved > 0 {
            tracing::info!(resolved = report.resolved, "auto-resolved low-severity conflicts");
        }
        if report.failed > 0 {
            tracing::warn!(failed = report.failed, "some conflicts failed to auto-resolve");
        }
        Ok(report)
    }

    /// The explicit escalation pass: settle every parked conflict with
    /// one strategy, regardless of severity.
    pub async fn force_resolve_all(&self, strategy: Strategy) -> Result<ResolvePassReport> {
        let mut report = ResolvePassReport::default();
        for unresolved in self.list_unresolved().await? {
            match self
                .resolve_entry(&unresolved.entry.id, strategy, EntryStatus::Resolved)
                .await
            {
                Ok(_) => report.resolved += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(RecordError {
                        id: unresolved.entry.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Unresolved-conflict tallies per table, by severity.
    pub async fn conflict_stats(&self) -> Result<Vec<KindConflictStats>> {
        let mut by_kind: std::collections::BTreeMap<EntityKind, KindConflictStats> =
            std::collections::BTreeMap::new();

        for conflict in self.list_unresolved().await? {
            let Some(kind) = conflict.entry.kind else {
                continue;
            };
            let slot = by_kind.entry(kind).or_insert(KindConflictStats {
                kind,
                total: 0,
                critical: 0,
                high: 0,
                medium: 0,
                low: 0,
            });
            slot.total += 1;
            match conflict.detail.severity {
                Impact::Critical => slot.critical += 1,
                Impact::High => slot.high += 1,
                Impact::Medium => slot.medium += 1,
                Impact::Low => slot.low += 1,
            }
        }

        Ok(by_kind.into_values().collect())
    }
}
