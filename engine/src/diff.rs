//! Field-level diffing between a local and a remote copy of one record.
//!
//! Comparison is typed per the kind's field catalog instead of comparing
//! serialized text, so `1` and `1.0` are equal as numbers and timestamps
//! are equal at second granularity regardless of sub-second noise.

use crate::{EntityKind, FieldType, Impact, RecordData};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// One differing field between the two copies of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub local_value: Value,
    pub remote_value: Value,
    pub field_type: FieldType,
    pub impact: Impact,
}

/// Compare every payload field present on either side, except identity and
/// replication bookkeeping. Returns diffs in field-name order.
pub fn diff_records(kind: EntityKind, local: &RecordData, remote: &RecordData) -> Vec<FieldDiff> {
    let names: BTreeSet<&str> = local
        .fields
        .keys()
        .chain(remote.fields.keys())
        .map(String::as_str)
        .filter(|name| !EntityKind::is_system_field(name))
        .collect();

    let mut diffs = Vec::new();
    for name in names {
        let local_value = local.field(name);
        let remote_value = remote.field(name);
        let field_type = kind.field_type(name);

        if !values_equal(field_type, local_value, remote_value) {
            diffs.push(FieldDiff {
                field: name.to_string(),
                local_value: local_value.clone(),
                remote_value: remote_value.clone(),
                field_type,
                impact: kind.field_impact(name),
            });
        }
    }

    diffs
}

/// Typed equality for one field.
///
/// Falls back to structural JSON equality when either side does not have
/// the catalogued type, so nested collections and nulls compare soundly.
pub fn values_equal(field_type: FieldType, a: &Value, b: &Value) -> bool {
    match field_type {
        FieldType::Numeric => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        FieldType::Date => match (a.as_i64(), b.as_i64()) {
            // Epoch milliseconds, compared at second granularity
            (Some(x), Some(y)) => x.div_euclid(1000) == y.div_euclid(1000),
            _ => a == b,
        },
        FieldType::Boolean => match (a.as_bool(), b.as_bool()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        FieldType::Text => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}
