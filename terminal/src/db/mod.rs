//! Local store: SQLite persistence for business records, the change log,
//! and settings.
//!
//! Entity tables get their own modules; the kind-dispatched functions here
//! are the surface the sync engines talk to, so push/pull code never
//! matches on table names itself.

pub mod changelog;
pub mod movements;
mod pool;
pub mod products;
pub mod sales;
pub mod settings;

pub use pool::{create_memory_pool, create_pool, run_migrations, Pool};

use crate::error::{Result, SyncError};
use serde::Serialize;
use serde_json::{Map, Value};
use till_engine::{EntityKind, RecordData, SyncStatus, Timestamp};

/// Pending-record counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub products: i64,
    pub sales: i64,
    pub stock_movements: i64,
    pub total: i64,
}

/// Fetch one record in engine shape, without line items.
pub async fn record_data(
    pool: &Pool,
    kind: EntityKind,
    id: &str,
) -> Result<Option<RecordData>> {
    match kind {
        EntityKind::Product => Ok(products::get_product(pool, id)
            .await?
            .map(|row| row.to_record_data())),
        EntityKind::Sale => Ok(sales::get_sale(pool, id)
            .await?
            .map(|row| row.to_record_data())),
        EntityKind::StockMovement => Ok(movements::get_movement(pool, id)
            .await?
            .map(|row| row.to_record_data())),
    }
}

/// Records awaiting push: sync status `pending` or `conflict`.
pub async fn list_pending_records(pool: &Pool, kind: EntityKind) -> Result<Vec<RecordData>> {
    match kind {
        EntityKind::Product => Ok(products::list_pending_products(pool)
            .await?
            .iter()
            .map(products::ProductRow::to_record_data)
            .collect()),
        EntityKind::Sale => Ok(sales::list_pending_sales(pool)
            .await?
            .iter()
            .map(sales::SaleRow::to_record_data)
            .collect()),
        EntityKind::StockMovement => Ok(movements::list_pending_movements(pool)
            .await?
            .iter()
            .map(movements::MovementRow::to_record_data)
            .collect()),
    }
}

/// Insert a record with the given status. Timestamps come from the record.
pub async fn create_record(
    pool: &Pool,
    kind: EntityKind,
    record: &RecordData,
    status: SyncStatus,
) -> Result<()> {
    match kind {
        EntityKind::Product => products::insert_product(pool, record, status).await,
        EntityKind::Sale => sales::insert_sale(pool, record, status).await,
        EntityKind::StockMovement => movements::insert_movement(pool, record, status).await,
    }
}

/// Overwrite a record's business fields and timestamps with the given
/// status. Fails with `NotFound` if the row does not exist.
pub async fn update_record_fields(
    pool: &Pool,
    kind: EntityKind,
    record: &RecordData,
    status: SyncStatus,
) -> Result<()> {
    match kind {
        EntityKind::Product => products::update_product_fields(pool, record, status).await,
        EntityKind::Sale => sales::update_sale_fields(pool, record, status).await,
        // Immutable rows are never rewritten
        EntityKind::StockMovement => Ok(()),
    }
}

/// Flip the sync status without touching anything else.
pub async fn set_record_sync_status(
    pool: &Pool,
    kind: EntityKind,
    id: &str,
    status: SyncStatus,
) -> Result<()> {
    let query = match kind {
        EntityKind::Product => "UPDATE products SET sync_status = ? WHERE id = ?",
        EntityKind::Sale => "UPDATE sales SET sync_status = ? WHERE id = ?",
        EntityKind::StockMovement => "UPDATE stock_movements SET sync_status = ? WHERE id = ?",
    };
    let result = sqlx::query(query)
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("{kind} record {id}")));
    }
    Ok(())
}

/// Flip the sync status and bump `updated_at`, making the local copy the
/// newest write. Used when a resolution decides the local side wins.
pub async fn touch_record_sync_status(
    pool: &Pool,
    kind: EntityKind,
    id: &str,
    status: SyncStatus,
    now: Timestamp,
) -> Result<()> {
    let query = match kind {
        EntityKind::Product => "UPDATE products SET sync_status = ?, updated_at = ? WHERE id = ?",
        EntityKind::Sale => "UPDATE sales SET sync_status = ?, updated_at = ? WHERE id = ?",
        // No updated_at column on immutable rows
        EntityKind::StockMovement => {
            return set_record_sync_status(pool, kind, id, status).await
        }
    };
    let result = sqlx::query(query)
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("{kind} record {id}")));
    }
    Ok(())
}

/// Mark a record as in agreement with the remote.
pub async fn mark_record_synced(pool: &Pool, kind: EntityKind, id: &str) -> Result<()> {
    set_record_sync_status(pool, kind, id, SyncStatus::Synced).await
}

/// Count pending records across all tables, probed concurrently.
pub async fn pending_counts(pool: &Pool) -> Result<PendingCounts> {
    let (products, sales, stock_movements) = futures::try_join!(
        count_pending(pool, "products"),
        count_pending(pool, "sales"),
        count_pending(pool, "stock_movements"),
    )?;
    Ok(PendingCounts {
        products,
        sales,
        stock_movements,
        total: products + sales + stock_movements,
    })
}

async fn count_pending(pool: &Pool, table: &'static str) -> Result<i64> {
    let query = format!("SELECT COUNT(*) FROM {table} WHERE sync_status = 'pending'");
    let count: i64 = sqlx::query_scalar(&query).fetch_one(pool).await?;
    Ok(count)
}

// Field extraction helpers shared by the entity modules. Remote payloads
// are JSON; absent or mistyped optional fields degrade to defaults, while
// required fields fail the record with a transform error.

pub(crate) fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn required_text_field(
    fields: &Map<String, Value>,
    key: &str,
    record_id: &str,
) -> Result<String> {
    text_field(fields, key).ok_or_else(|| {
        SyncError::Transform(format!("record {record_id} is missing text field '{key}'"))
    })
}

pub(crate) fn num_field(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn bool_field(fields: &Map<String, Value>, key: &str, default: bool) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "name": "Beans",
            "price": 12.5,
            "active": true,
            "missing_type": 7,
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn extraction_helpers() {
        let fields = fields();
        assert_eq!(text_field(&fields, "name").as_deref(), Some("Beans"));
        assert_eq!(text_field(&fields, "missing_type"), None);
        assert_eq!(num_field(&fields, "price"), 12.5);
        assert_eq!(num_field(&fields, "absent"), 0.0);
        assert!(bool_field(&fields, "active", false));
        assert!(bool_field(&fields, "absent", true));
    }

    #[test]
    fn required_field_errors_name_the_record() {
        let fields = fields();
        let err = required_text_field(&fields, "sku", "p9").unwrap_err();
        assert!(err.to_string().contains("p9"));
        assert!(err.is_record_level());
    }
}
