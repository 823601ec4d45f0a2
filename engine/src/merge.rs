//! Type-aware, field-by-field merging of a conflicting record pair.

use crate::{FieldDiff, FieldType, RecordData, Timestamp};
use serde_json::Value;

/// Merge the two sides of a conflict into one record.
///
/// Policy, per field type of each differing field:
/// numeric price/amount/quantity/stock fields take the higher value, other
/// numerics take the remote value; dates take the later instant; booleans
/// OR together; text keeps the local value unless it is empty. Fields that
/// did not differ keep their local value. The merged record gets a fresh
/// `updated_at` so it supersedes both inputs on the next cycle.
pub fn merge_fields(
    local: &RecordData,
    remote: &RecordData,
    differences: &[FieldDiff],
    now: Timestamp,
) -> RecordData {
    let mut merged = local.clone();
    merged.updated_at = now;

    for diff in differences {
        let value = merge_value(diff);
        merged.fields.insert(diff.field.clone(), value);
    }

    merged
}

fn merge_value(diff: &FieldDiff) -> Value {
    let local = &diff.local_value;
    let remote = &diff.remote_value;

    match diff.field_type {
        FieldType::Numeric => {
            if is_magnitude_field(&diff.field) {
                numeric_max(local, remote)
            } else {
                remote.clone()
            }
        }
        FieldType::Date => numeric_max(local, remote),
        FieldType::Boolean => {
            let either = local.as_bool().unwrap_or(false) || remote.as_bool().unwrap_or(false);
            Value::Bool(either)
        }
        FieldType::Text => {
            let local_filled = local
                .as_str()
                .is_some_and(|text| !text.trim().is_empty());
            if local_filled {
                local.clone()
            } else {
                remote.clone()
            }
        }
    }
}

/// Prices, amounts, quantities and stock levels merge towards the higher
/// value; losing either side's increase is worse than overshooting.
fn is_magnitude_field(field: &str) -> bool {
    field.contains("price")
        || field.contains("amount")
        || field.contains("quantity")
        || field.contains("stock")
}

fn numeric_max(local: &Value, remote: &Value) -> Value {
    match (local.as_f64(), remote.as_f64()) {
        (Some(l), Some(r)) => {
            if l >= r {
                local.clone()
            } else {
                remote.clone()
            }
        }
        (Some(_), None) => local.clone(),
        _ => remote.clone(),
    }
}
