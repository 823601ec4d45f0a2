//! Aggregate results of push/pull batches and whole cycles.

use crate::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record that failed, with its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub id: String,
    pub error: String,
}

/// Per-table outcome of one push or pull batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub success: u32,
    pub failed: u32,
    /// Conflicts detected; always zero for push batches
    pub conflicts: u32,
    pub errors: Vec<RecordError>,
}

impl TableReport {
    pub fn record_success(&mut self) {
        self.success += 1;
    }

    pub fn record_failure(&mut self, id: impl Into<String>, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(RecordError {
            id: id.into(),
            error: error.into(),
        });
    }

    pub fn record_conflict(&mut self) {
        self.conflicts += 1;
    }
}

/// Outcome of one direction (push or pull) across all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub tables: BTreeMap<EntityKind, TableReport>,
}

impl SyncReport {
    pub fn insert(&mut self, kind: EntityKind, report: TableReport) {
        self.tables.insert(kind, report);
    }

    pub fn table(&self, kind: EntityKind) -> Option<&TableReport> {
        self.tables.get(&kind)
    }

    pub fn total_success(&self) -> u32 {
        self.tables.values().map(|t| t.success).sum()
    }

    pub fn total_failed(&self) -> u32 {
        self.tables.values().map(|t| t.failed).sum()
    }

    pub fn total_conflicts(&self) -> u32 {
        self.tables.values().map(|t| t.conflicts).sum()
    }
}

/// Outcome of one full sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub push: Option<SyncReport>,
    pub pull: Option<SyncReport>,
    /// Low-severity conflicts closed by the post-cycle pass
    pub auto_resolved: u32,
    pub duration_ms: u64,
}
