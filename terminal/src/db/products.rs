//! Product persistence and the stock-adjustment business operation.

use crate::db::{bool_field, num_field, required_text_field, text_field, Pool};
use crate::error::{Result, SyncError};
use serde_json::json;
use sqlx::Row;
use till_engine::{RecordData, SyncStatus, Timestamp};
use uuid::Uuid;

/// A product row from the local database.
#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub cost_price: f64,
    pub selling_price: f64,
    pub tax_rate: f64,
    pub stock_quantity: f64,
    pub min_stock_level: f64,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub store_id: Option<String>,
    pub sync_status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for ProductRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            barcode: row.try_get("barcode")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category_id: row.try_get("category_id")?,
            cost_price: row.try_get("cost_price")?,
            selling_price: row.try_get("selling_price")?,
            tax_rate: row.try_get("tax_rate")?,
            stock_quantity: row.try_get("stock_quantity")?,
            min_stock_level: row.try_get("min_stock_level")?,
            unit: row.try_get("unit")?,
            image_url: row.try_get("image_url")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            store_id: row.try_get("store_id")?,
            sync_status: row.try_get("sync_status")?,
        })
    }
}

impl ProductRow {
    /// Convert to the engine-side record shape.
    pub fn to_record_data(&self) -> RecordData {
        RecordData::new(&self.id, self.created_at, self.updated_at)
            .with_field("sku", json!(self.sku))
            .with_field("barcode", json!(self.barcode))
            .with_field("name", json!(self.name))
            .with_field("description", json!(self.description))
            .with_field("category_id", json!(self.category_id))
            .with_field("cost_price", json!(self.cost_price))
            .with_field("selling_price", json!(self.selling_price))
            .with_field("tax_rate", json!(self.tax_rate))
            .with_field("stock_quantity", json!(self.stock_quantity))
            .with_field("min_stock_level", json!(self.min_stock_level))
            .with_field("unit", json!(self.unit))
            .with_field("image_url", json!(self.image_url))
            .with_field("is_active", json!(self.is_active))
            .with_field("store_id", json!(self.store_id))
    }
}

const SELECT_COLUMNS: &str = "id, sku, barcode, name, description, category_id, cost_price, \
     selling_price, tax_rate, stock_quantity, min_stock_level, unit, image_url, is_active, \
     created_at, updated_at, store_id, sync_status";

/// Get a product by ID.
pub async fn get_product(pool: &Pool, id: &str) -> Result<Option<ProductRow>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM products WHERE id = ?");
    Ok(sqlx::query_as::<_, ProductRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Products awaiting push.
pub async fn list_pending_products(pool: &Pool) -> Result<Vec<ProductRow>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM products \
         WHERE sync_status = 'pending' OR sync_status = 'conflict' \
         ORDER BY updated_at ASC"
    );
    Ok(sqlx::query_as::<_, ProductRow>(&query)
        .fetch_all(pool)
        .await?)
}

/// Insert a product from engine-shaped data.
pub async fn insert_product(pool: &Pool, record: &RecordData, status: SyncStatus) -> Result<()> {
    let name = required_text_field(&record.fields, "name", &record.id)?;
    sqlx::query(
        "INSERT INTO products (
            id, sku, barcode, name, description, category_id, cost_price, selling_price,
            tax_rate, stock_quantity, min_stock_level, unit, image_url, is_active,
            created_at, updated_at, store_id, sync_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(text_field(&record.fields, "sku"))
    .bind(text_field(&record.fields, "barcode"))
    .bind(name)
    .bind(text_field(&record.fields, "description"))
    .bind(text_field(&record.fields, "category_id"))
    .bind(num_field(&record.fields, "cost_price"))
    .bind(num_field(&record.fields, "selling_price"))
    .bind(num_field(&record.fields, "tax_rate"))
    .bind(num_field(&record.fields, "stock_quantity"))
    .bind(num_field(&record.fields, "min_stock_level"))
    .bind(text_field(&record.fields, "unit"))
    .bind(text_field(&record.fields, "image_url"))
    .bind(bool_field(&record.fields, "is_active", true))
    .bind(record.created_at)
    .bind(record.updated_at)
    .bind(text_field(&record.fields, "store_id"))
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite a product's business fields and timestamps.
pub async fn update_product_fields(
    pool: &Pool,
    record: &RecordData,
    status: SyncStatus,
) -> Result<()> {
    let name = required_text_field(&record.fields, "name", &record.id)?;
    let result = sqlx::query(
        "UPDATE products SET
            sku = ?, barcode = ?, name = ?, description = ?, category_id = ?,
            cost_price = ?, selling_price = ?, tax_rate = ?, stock_quantity = ?,
            min_stock_level = ?, unit = ?, image_url = ?, is_active = ?,
            updated_at = ?, store_id = ?, sync_status = ?
         WHERE id = ?",
    )
    .bind(text_field(&record.fields, "sku"))
    .bind(text_field(&record.fields, "barcode"))
    .bind(name)
    .bind(text_field(&record.fields, "description"))
    .bind(text_field(&record.fields, "category_id"))
    .bind(num_field(&record.fields, "cost_price"))
    .bind(num_field(&record.fields, "selling_price"))
    .bind(num_field(&record.fields, "tax_rate"))
    .bind(num_field(&record.fields, "stock_quantity"))
    .bind(num_field(&record.fields, "min_stock_level"))
    .bind(text_field(&record.fields, "unit"))
    .bind(text_field(&record.fields, "image_url"))
    .bind(bool_field(&record.fields, "is_active", true))
    .bind(record.updated_at)
    .bind(text_field(&record.fields, "store_id"))
    .bind(status.as_str())
    .bind(&record.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("product {}", record.id)));
    }
    Ok(())
}

/// A guarded stock adjustment.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub product_id: String,
    /// Signed quantity delta; deductions are negative
    pub delta: f64,
    pub movement_type: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

/// Apply a stock adjustment and write its audit row in one transaction.
///
/// A deduction below zero fails with `InsufficientStock` and rolls the
/// whole transaction back. Returns the new movement's id.
pub async fn adjust_stock(
    pool: &Pool,
    adjustment: &StockAdjustment,
    store_id: &str,
    now: Timestamp,
) -> Result<String> {
    let mut tx = pool.begin().await?;

    let stock: Option<f64> =
        sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?")
            .bind(&adjustment.product_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(stock) = stock else {
        return Err(SyncError::NotFound(format!(
            "product {}",
            adjustment.product_id
        )));
    };

    let new_stock = stock + adjustment.delta;
    if new_stock < 0.0 {
        return Err(SyncError::InsufficientStock(adjustment.product_id.clone()));
    }

    sqlx::query(
        "UPDATE products SET stock_quantity = ?, updated_at = ?, sync_status = 'pending' \
         WHERE id = ?",
    )
    .bind(new_stock)
    .bind(now)
    .bind(&adjustment.product_id)
    .execute(&mut *tx)
    .await?;

    let movement_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO stock_movements (
            id, product_id, movement_type, quantity, reference_type, reference_id,
            notes, created_at, store_id, sync_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
    )
    .bind(&movement_id)
    .bind(&adjustment.product_id)
    .bind(&adjustment.movement_type)
    .bind(adjustment.delta)
    .bind(&adjustment.reference_type)
    .bind(&adjustment.reference_id)
    .bind(&adjustment.notes)
    .bind(now)
    .bind(store_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(movement_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use serde_json::json;

    fn beans(updated_at: i64) -> RecordData {
        RecordData::new("p1", 1_000, updated_at)
            .with_field("name", json!("Beans"))
            .with_field("selling_price", json!(10.0))
            .with_field("stock_quantity", json!(5.0))
            .with_field("is_active", json!(true))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let pool = create_memory_pool().await.unwrap();
        insert_product(&pool, &beans(2_000), SyncStatus::Pending)
            .await
            .unwrap();

        let row = get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(row.name, "Beans");
        assert_eq!(row.selling_price, 10.0);
        assert_eq!(row.sync_status, "pending");
        assert_eq!(row.updated_at, 2_000);
        assert!(row.is_active);

        let record = row.to_record_data();
        assert_eq!(record.field("selling_price"), &json!(10.0));
        assert_eq!(record.field("sku"), &json!(null));
    }

    #[tokio::test]
    async fn insert_requires_a_name() {
        let pool = create_memory_pool().await.unwrap();
        let nameless = RecordData::new("p1", 0, 0).with_field("selling_price", json!(1.0));
        let err = insert_product(&pool, &nameless, SyncStatus::Synced)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transform(_)));
    }

    #[tokio::test]
    async fn pending_listing_includes_conflict_rows() {
        let pool = create_memory_pool().await.unwrap();
        insert_product(&pool, &beans(1_000), SyncStatus::Pending)
            .await
            .unwrap();
        let mut second = beans(2_000);
        second.id = "p2".to_string();
        insert_product(&pool, &second, SyncStatus::Conflict)
            .await
            .unwrap();
        let mut third = beans(3_000);
        third.id = "p3".to_string();
        insert_product(&pool, &third, SyncStatus::Synced)
            .await
            .unwrap();

        let pending = list_pending_products(&pool).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn update_overwrites_fields() {
        let pool = create_memory_pool().await.unwrap();
        insert_product(&pool, &beans(1_000), SyncStatus::Synced)
            .await
            .unwrap();

        let newer = beans(9_000).with_field("selling_price", json!(12.0));
        update_product_fields(&pool, &newer, SyncStatus::Synced)
            .await
            .unwrap();

        let row = get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(row.selling_price, 12.0);
        assert_eq!(row.updated_at, 9_000);
    }

    #[tokio::test]
    async fn update_missing_product_is_not_found() {
        let pool = create_memory_pool().await.unwrap();
        let err = update_product_fields(&pool, &beans(1_000), SyncStatus::Synced)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn stock_adjustment_writes_movement() {
        let pool = create_memory_pool().await.unwrap();
        insert_product(&pool, &beans(1_000), SyncStatus::Synced)
            .await
            .unwrap();

        let adjustment = StockAdjustment {
            product_id: "p1".to_string(),
            delta: -2.0,
            movement_type: "sale".to_string(),
            reference_type: Some("sale".to_string()),
            reference_id: Some("s1".to_string()),
            notes: None,
        };
        adjust_stock(&pool, &adjustment, "store-1", 5_000)
            .await
            .unwrap();

        let row = get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 3.0);
        assert_eq!(row.sync_status, "pending");

        let movements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE product_id = 'p1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(movements, 1);
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back() {
        let pool = create_memory_pool().await.unwrap();
        insert_product(&pool, &beans(1_000), SyncStatus::Synced)
            .await
            .unwrap();

        let adjustment = StockAdjustment {
            product_id: "p1".to_string(),
            delta: -9.0,
            movement_type: "sale".to_string(),
            reference_type: None,
            reference_id: None,
            notes: None,
        };
        let err = adjust_stock(&pool, &adjustment, "store-1", 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InsufficientStock(_)));

        let row = get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(row.stock_quantity, 5.0);
        assert_eq!(row.sync_status, "synced");

        let movements: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(movements, 0);
    }
}
