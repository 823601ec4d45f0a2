//! Record shapes shared by both sides of the sync boundary.

use crate::{Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Replication state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Locally mutated, not yet announced to the remote
    Pending,
    /// In agreement with the remote as of the last cycle
    Synced,
    /// Divergent; parked for resolution
    Conflict,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(Error::InvalidSyncStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record as seen by the diff engine: identity, timestamps, and the
/// comparable payload fields.
///
/// The payload is a JSON object keyed by canonical field name. Identity
/// (`id`) and timestamps are carried outside the payload so the diff only
/// ever sees business fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub id: String,
    pub fields: Map<String, Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RecordData {
    pub fn new(id: impl Into<String>, created_at: Timestamp, updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
            created_at,
            updated_at,
        }
    }

    /// Set a payload field, builder-style.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a payload field, `Null` if absent.
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    /// Flatten into a single wire object: `id`, timestamps, and all payload
    /// fields at the top level.
    pub fn to_wire(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("created_at".to_string(), Value::from(self.created_at));
        object.insert("updated_at".to_string(), Value::from(self.updated_at));
        Value::Object(object)
    }

    /// Parse a wire object back into a record. `id`, `created_at` and
    /// `updated_at` are lifted out of the object; `sync_status` is dropped
    /// (the remote's copy of it is meaningless locally); everything else
    /// stays in the payload.
    pub fn from_wire(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::MalformedRecord("expected a JSON object".to_string()));
        };

        let id = match object.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => {
                return Err(Error::MalformedRecord(
                    "missing or empty 'id' field".to_string(),
                ))
            }
        };

        let created_at = take_timestamp(&mut object, "created_at")?;
        let updated_at = match object.get("updated_at") {
            Some(_) => take_timestamp(&mut object, "updated_at")?,
            // Immutable rows only carry created_at
            None => created_at,
        };
        object.remove("sync_status");

        Ok(Self {
            id,
            fields: object,
            created_at,
            updated_at,
        })
    }
}

fn take_timestamp(object: &mut Map<String, Value>, key: &str) -> Result<Timestamp> {
    object
        .remove(key)
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::MalformedRecord(format!("missing or non-integer '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_roundtrip() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Conflict] {
            assert_eq!(SyncStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SyncStatus::parse("done").is_err());
    }

    #[test]
    fn wire_roundtrip() {
        let record = RecordData::new("p1", 1_000, 2_000)
            .with_field("name", json!("Beans"))
            .with_field("selling_price", json!(12.5));

        let wire = record.to_wire();
        assert_eq!(wire["id"], json!("p1"));
        assert_eq!(wire["updated_at"], json!(2_000));

        let parsed = RecordData::from_wire(wire).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn from_wire_drops_sync_status() {
        let parsed = RecordData::from_wire(json!({
            "id": "p1",
            "created_at": 1000,
            "updated_at": 2000,
            "sync_status": "synced",
            "name": "Beans",
        }))
        .unwrap();

        assert!(!parsed.fields.contains_key("sync_status"));
        assert_eq!(parsed.field("name"), &json!("Beans"));
    }

    #[test]
    fn from_wire_defaults_updated_at_for_immutable_rows() {
        let parsed = RecordData::from_wire(json!({
            "id": "m1",
            "created_at": 5000,
            "quantity": -2,
        }))
        .unwrap();

        assert_eq!(parsed.updated_at, 5_000);
    }

    #[test]
    fn from_wire_rejects_missing_id() {
        assert!(RecordData::from_wire(json!({"created_at": 1, "updated_at": 2})).is_err());
        assert!(RecordData::from_wire(json!([1, 2])).is_err());
    }

    #[test]
    fn absent_field_reads_null() {
        let record = RecordData::new("p1", 0, 0);
        assert_eq!(record.field("name"), &Value::Null);
    }
}
