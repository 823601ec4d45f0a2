//! Conflict classification for a record pair.
//!
//! Given the local and remote copy of one record, classification decides
//! whether the pair is identical, deterministically ordered by timestamp,
//! or genuinely conflicting. The two time windows are heuristics inherited
//! from the original deployment; they are carried as configuration, not
//! constants.

use crate::{diff_records, EntityKind, FieldDiff, Impact, RecordData, Timestamp};
use serde::{Deserialize, Serialize};

/// Time windows (epoch-millisecond deltas) driving classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindows {
    /// Below this delta the two timestamps count as the same instant.
    pub identical_ms: i64,
    /// Below this delta the two writes count as near-simultaneous.
    pub near_ms: i64,
}

impl Default for SyncWindows {
    fn default() -> Self {
        Self {
            identical_ms: 1_000,
            near_ms: 300_000,
        }
    }
}

/// Why a record pair is considered conflicting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Same timestamp (within the identical window), different content
    TimestampConflict,
    /// Written within the near-simultaneous window with differing content
    NearSimultaneousConflict,
}

/// A detected conflict between the local and remote copy of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: EntityKind,
    pub record_id: String,
    pub conflict_type: ConflictType,
    pub differences: Vec<FieldDiff>,
    pub severity: Impact,
    pub local: RecordData,
    pub remote: RecordData,
}

/// Outcome of classifying a local/remote record pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Same content; nothing to do
    Identical,
    /// Local copy is authoritative; leave it for the next push
    LocalNewer,
    /// Remote copy is authoritative; overwrite local
    RemoteNewer,
    /// Neither side wins deterministically
    Conflict(Box<Conflict>),
}

/// Severity of a set of differences: the maximum impact among them.
pub fn severity(differences: &[FieldDiff]) -> Impact {
    differences
        .iter()
        .map(|diff| diff.impact)
        .max()
        .unwrap_or(Impact::Low)
}

/// Classify a record pair.
pub fn classify(
    kind: EntityKind,
    local: &RecordData,
    remote: &RecordData,
    windows: SyncWindows,
) -> Disposition {
    let delta = delta_ms(local.updated_at, remote.updated_at);

    if delta < windows.identical_ms {
        let differences = diff_records(kind, local, remote);
        if differences.is_empty() {
            return Disposition::Identical;
        }
        return conflict(kind, local, remote, ConflictType::TimestampConflict, differences);
    }

    if delta < windows.near_ms {
        let differences = diff_records(kind, local, remote);
        if !differences.is_empty() {
            return conflict(
                kind,
                local,
                remote,
                ConflictType::NearSimultaneousConflict,
                differences,
            );
        }
        // Same content despite the gap; only the ordering matters
    }

    if local.updated_at > remote.updated_at {
        Disposition::LocalNewer
    } else {
        Disposition::RemoteNewer
    }
}

fn conflict(
    kind: EntityKind,
    local: &RecordData,
    remote: &RecordData,
    conflict_type: ConflictType,
    differences: Vec<FieldDiff>,
) -> Disposition {
    let severity = severity(&differences);
    Disposition::Conflict(Box::new(Conflict {
        kind,
        record_id: local.id.clone(),
        conflict_type,
        differences,
        severity,
        local: local.clone(),
        remote: remote.clone(),
    }))
}

fn delta_ms(a: Timestamp, b: Timestamp) -> i64 {
    (a - b).abs()
}
