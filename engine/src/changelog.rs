//! Change-log entry model.
//!
//! Every sync attempt appends one immutable entry. The log doubles as the
//! audit trail and as the durable conflict inbox: entries with operation
//! `conflict` and status `conflict` are unresolved work items until a
//! resolution flips their status.

use crate::{Conflict, ConflictType, EntityKind, Error, FieldDiff, Impact, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Which engine produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Push,
    Pull,
    Conflict,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::Push => "push",
            SyncOperation::Pull => "pull",
            SyncOperation::Conflict => "conflict",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "push" => Ok(SyncOperation::Push),
            "pull" => Ok(SyncOperation::Pull),
            "conflict" => Ok(SyncOperation::Conflict),
            other => Err(Error::UnknownValue {
                what: "sync operation",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome recorded on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Success,
    Error,
    /// Unresolved conflict awaiting action
    Conflict,
    /// Conflict closed by an operator
    Resolved,
    /// Conflict closed by the automatic low-severity pass
    AutoResolved,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Success => "success",
            EntryStatus::Error => "error",
            EntryStatus::Conflict => "conflict",
            EntryStatus::Resolved => "resolved",
            EntryStatus::AutoResolved => "auto_resolved",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "success" => Ok(EntryStatus::Success),
            "error" => Ok(EntryStatus::Error),
            "conflict" => Ok(EntryStatus::Conflict),
            "resolved" => Ok(EntryStatus::Resolved),
            "auto_resolved" => Ok(EntryStatus::AutoResolved),
            other => Err(Error::UnknownValue {
                what: "change-log status",
                value: other.to_string(),
            }),
        }
    }
}

/// One immutable change-log entry.
///
/// `kind` and `record_id` are absent on cycle-level entries (for example a
/// whole table failing to pull).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: String,
    pub operation: SyncOperation,
    pub kind: Option<EntityKind>,
    pub record_id: Option<String>,
    pub status: EntryStatus,
    pub detail: Option<String>,
    pub created_at: Timestamp,
}

impl ChangeLogEntry {
    pub fn new(
        id: impl Into<String>,
        operation: SyncOperation,
        kind: Option<EntityKind>,
        record_id: Option<String>,
        status: EntryStatus,
        detail: Option<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            kind,
            record_id,
            status,
            detail,
            created_at,
        }
    }

    /// Parse the conflict payload of a conflict entry.
    pub fn conflict_detail(&self) -> Result<ConflictDetail> {
        let detail = self
            .detail
            .as_deref()
            .ok_or_else(|| Error::MalformedDetail("conflict entry without detail".to_string()))?;
        ConflictDetail::from_json(detail)
    }
}

/// The durable payload of a persisted conflict: enough to review and to
/// re-classify once both sides are re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub conflict_type: ConflictType,
    pub severity: Impact,
    pub differences: Vec<FieldDiff>,
    pub local_updated_at: Timestamp,
    pub remote_updated_at: Timestamp,
}

impl ConflictDetail {
    pub fn from_conflict(conflict: &Conflict) -> Self {
        Self {
            conflict_type: conflict.conflict_type,
            severity: conflict.severity,
            differences: conflict.differences.clone(),
            local_updated_at: conflict.local.updated_at,
            remote_updated_at: conflict.remote.updated_at,
        }
    }

    pub fn to_json(&self) -> String {
        // Serialization of a plain data struct cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedDetail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify, Disposition, RecordData, SyncWindows};
    use serde_json::json;

    #[test]
    fn operation_and_status_roundtrip() {
        for op in [SyncOperation::Push, SyncOperation::Pull, SyncOperation::Conflict] {
            assert_eq!(SyncOperation::parse(op.as_str()).unwrap(), op);
        }
        for status in [
            EntryStatus::Success,
            EntryStatus::Error,
            EntryStatus::Conflict,
            EntryStatus::Resolved,
            EntryStatus::AutoResolved,
        ] {
            assert_eq!(EntryStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SyncOperation::parse("merge").is_err());
        assert!(EntryStatus::parse("done").is_err());
    }

    #[test]
    fn auto_resolved_wire_name() {
        assert_eq!(EntryStatus::AutoResolved.as_str(), "auto_resolved");
    }

    #[test]
    fn conflict_detail_roundtrip() {
        let local = RecordData::new("p1", 0, 10_000).with_field("selling_price", json!(10));
        let remote =
            RecordData::new("p1", 0, 130_000).with_field("selling_price", json!(12));

        let Disposition::Conflict(conflict) =
            classify(crate::EntityKind::Product, &local, &remote, SyncWindows::default())
        else {
            panic!("expected conflict");
        };

        let detail = ConflictDetail::from_conflict(&conflict);
        let parsed = ConflictDetail::from_json(&detail.to_json()).unwrap();
        assert_eq!(parsed, detail);
        assert_eq!(parsed.severity, Impact::High);
        assert_eq!(parsed.local_updated_at, 10_000);
        assert_eq!(parsed.remote_updated_at, 130_000);
    }

    #[test]
    fn entry_without_detail_is_rejected() {
        let entry = ChangeLogEntry::new(
            "log-1",
            SyncOperation::Conflict,
            Some(crate::EntityKind::Product),
            Some("p1".to_string()),
            EntryStatus::Conflict,
            None,
            1_000,
        );
        assert!(entry.conflict_detail().is_err());
    }
}
