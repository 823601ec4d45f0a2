//! Stock-movement persistence. Movements are immutable audit rows; they
//! are only ever inserted, listed, and marked synced.

use crate::db::{num_field, required_text_field, text_field, Pool};
use crate::error::Result;
use serde_json::json;
use sqlx::Row;
use till_engine::{RecordData, SyncStatus};

/// A stock movement row from the local database.
#[derive(Debug, Clone)]
pub struct MovementRow {
    pub id: String,
    pub product_id: String,
    pub movement_type: String,
    pub quantity: f64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub store_id: Option<String>,
    pub sync_status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for MovementRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            store_id: row.try_get("store_id")?,
            sync_status: row.try_get("sync_status")?,
        })
    }
}

impl MovementRow {
    /// Convert to the engine-side record shape. Immutable rows have no
    /// update timestamp of their own.
    pub fn to_record_data(&self) -> RecordData {
        RecordData::new(&self.id, self.created_at, self.created_at)
            .with_field("product_id", json!(self.product_id))
            .with_field("movement_type", json!(self.movement_type))
            .with_field("quantity", json!(self.quantity))
            .with_field("reference_type", json!(self.reference_type))
            .with_field("reference_id", json!(self.reference_id))
            .with_field("notes", json!(self.notes))
            .with_field("store_id", json!(self.store_id))
    }
}

const SELECT_COLUMNS: &str = "id, product_id, movement_type, quantity, reference_type, \
     reference_id, notes, created_at, store_id, sync_status";

/// Get a movement by ID.
pub async fn get_movement(pool: &Pool, id: &str) -> Result<Option<MovementRow>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM stock_movements WHERE id = ?");
    Ok(sqlx::query_as::<_, MovementRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Whether a movement already exists locally.
pub async fn movement_exists(pool: &Pool, id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Movements awaiting push.
pub async fn list_pending_movements(pool: &Pool) -> Result<Vec<MovementRow>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM stock_movements \
         WHERE sync_status = 'pending' OR sync_status = 'conflict' \
         ORDER BY created_at ASC"
    );
    Ok(sqlx::query_as::<_, MovementRow>(&query)
        .fetch_all(pool)
        .await?)
}

/// Insert a movement from engine-shaped data.
pub async fn insert_movement(
    pool: &Pool,
    record: &RecordData,
    status: SyncStatus,
) -> Result<()> {
    let product_id = required_text_field(&record.fields, "product_id", &record.id)?;
    let movement_type = required_text_field(&record.fields, "movement_type", &record.id)?;
    sqlx::query(
        "INSERT INTO stock_movements (
            id, product_id, movement_type, quantity, reference_type, reference_id,
            notes, created_at, store_id, sync_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(product_id)
    .bind(movement_type)
    .bind(num_field(&record.fields, "quantity"))
    .bind(text_field(&record.fields, "reference_type"))
    .bind(text_field(&record.fields, "reference_id"))
    .bind(text_field(&record.fields, "notes"))
    .bind(record.created_at)
    .bind(text_field(&record.fields, "store_id"))
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use serde_json::json;

    fn movement(id: &str, created_at: i64) -> RecordData {
        RecordData::new(id, created_at, created_at)
            .with_field("product_id", json!("p1"))
            .with_field("movement_type", json!("adjustment"))
            .with_field("quantity", json!(-3.0))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let pool = create_memory_pool().await.unwrap();
        insert_movement(&pool, &movement("m1", 4_000), SyncStatus::Pending)
            .await
            .unwrap();

        let row = get_movement(&pool, "m1").await.unwrap().unwrap();
        assert_eq!(row.product_id, "p1");
        assert_eq!(row.quantity, -3.0);
        assert!(movement_exists(&pool, "m1").await.unwrap());
        assert!(!movement_exists(&pool, "m2").await.unwrap());

        let record = row.to_record_data();
        assert_eq!(record.updated_at, 4_000);
    }

    #[tokio::test]
    async fn pending_listing_is_in_creation_order() {
        let pool = create_memory_pool().await.unwrap();
        insert_movement(&pool, &movement("m2", 2_000), SyncStatus::Pending)
            .await
            .unwrap();
        insert_movement(&pool, &movement("m1", 1_000), SyncStatus::Pending)
            .await
            .unwrap();
        insert_movement(&pool, &movement("m3", 3_000), SyncStatus::Synced)
            .await
            .unwrap();

        let pending = list_pending_movements(&pool).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }
}
