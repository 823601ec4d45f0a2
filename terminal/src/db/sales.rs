//! Sale persistence, line-item replication, and the point-of-sale
//! business transaction.

use crate::db::{num_field, required_text_field, text_field, Pool};
use crate::error::{Result, SyncError};
use serde_json::json;
use sqlx::Row;
use till_engine::{RecordData, SyncStatus, Timestamp};
use uuid::Uuid;

/// A sale row from the local database, without its items.
#[derive(Debug, Clone)]
pub struct SaleRow {
    pub id: String,
    pub bill_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub payment_method: Option<String>,
    pub payment_status: Option<String>,
    pub staff_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub store_id: Option<String>,
    pub sync_status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SaleRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(SaleRow {
            id: row.try_get("id")?,
            bill_number: row.try_get("bill_number")?,
            customer_name: row.try_get("customer_name")?,
            customer_phone: row.try_get("customer_phone")?,
            subtotal: row.try_get("subtotal")?,
            discount_amount: row.try_get("discount_amount")?,
            tax_amount: row.try_get("tax_amount")?,
            total_amount: row.try_get("total_amount")?,
            payment_method: row.try_get("payment_method")?,
            payment_status: row.try_get("payment_status")?,
            staff_id: row.try_get("staff_id")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            store_id: row.try_get("store_id")?,
            sync_status: row.try_get("sync_status")?,
        })
    }
}

impl SaleRow {
    /// Convert to the engine-side record shape. Items travel separately.
    pub fn to_record_data(&self) -> RecordData {
        RecordData::new(&self.id, self.created_at, self.updated_at)
            .with_field("bill_number", json!(self.bill_number))
            .with_field("customer_name", json!(self.customer_name))
            .with_field("customer_phone", json!(self.customer_phone))
            .with_field("subtotal", json!(self.subtotal))
            .with_field("discount_amount", json!(self.discount_amount))
            .with_field("tax_amount", json!(self.tax_amount))
            .with_field("total_amount", json!(self.total_amount))
            .with_field("payment_method", json!(self.payment_method))
            .with_field("payment_status", json!(self.payment_status))
            .with_field("staff_id", json!(self.staff_id))
            .with_field("notes", json!(self.notes))
            .with_field("store_id", json!(self.store_id))
    }
}

/// A sale line item row.
#[derive(Debug, Clone)]
pub struct SaleItemRow {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total_price: f64,
    pub created_at: i64,
    pub sync_status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SaleItemRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(SaleItemRow {
            id: row.try_get("id")?,
            sale_id: row.try_get("sale_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            discount_amount: row.try_get("discount_amount")?,
            tax_amount: row.try_get("tax_amount")?,
            total_price: row.try_get("total_price")?,
            created_at: row.try_get("created_at")?,
            sync_status: row.try_get("sync_status")?,
        })
    }
}

impl SaleItemRow {
    pub fn to_record_data(&self) -> RecordData {
        RecordData::new(&self.id, self.created_at, self.created_at)
            .with_field("sale_id", json!(self.sale_id))
            .with_field("product_id", json!(self.product_id))
            .with_field("quantity", json!(self.quantity))
            .with_field("unit_price", json!(self.unit_price))
            .with_field("discount_amount", json!(self.discount_amount))
            .with_field("tax_amount", json!(self.tax_amount))
            .with_field("total_price", json!(self.total_price))
    }
}

const SELECT_COLUMNS: &str = "id, bill_number, customer_name, customer_phone, subtotal, \
     discount_amount, tax_amount, total_amount, payment_method, payment_status, staff_id, \
     notes, created_at, updated_at, store_id, sync_status";

const ITEM_COLUMNS: &str = "id, sale_id, product_id, quantity, unit_price, discount_amount, \
     tax_amount, total_price, created_at, sync_status";

/// Get a sale by ID, without items.
pub async fn get_sale(pool: &Pool, id: &str) -> Result<Option<SaleRow>> {
    let query = format!("SELECT {SELECT_COLUMNS} FROM sales WHERE id = ?");
    Ok(sqlx::query_as::<_, SaleRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Sales awaiting push.
pub async fn list_pending_sales(pool: &Pool) -> Result<Vec<SaleRow>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM sales \
         WHERE sync_status = 'pending' OR sync_status = 'conflict' \
         ORDER BY updated_at ASC"
    );
    Ok(sqlx::query_as::<_, SaleRow>(&query).fetch_all(pool).await?)
}

/// Insert a sale from engine-shaped data (no items).
pub async fn insert_sale(pool: &Pool, record: &RecordData, status: SyncStatus) -> Result<()> {
    sqlx::query(
        "INSERT INTO sales (
            id, bill_number, customer_name, customer_phone, subtotal, discount_amount,
            tax_amount, total_amount, payment_method, payment_status, staff_id, notes,
            created_at, updated_at, store_id, sync_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(text_field(&record.fields, "bill_number"))
    .bind(text_field(&record.fields, "customer_name"))
    .bind(text_field(&record.fields, "customer_phone"))
    .bind(num_field(&record.fields, "subtotal"))
    .bind(num_field(&record.fields, "discount_amount"))
    .bind(num_field(&record.fields, "tax_amount"))
    .bind(num_field(&record.fields, "total_amount"))
    .bind(text_field(&record.fields, "payment_method"))
    .bind(text_field(&record.fields, "payment_status"))
    .bind(text_field(&record.fields, "staff_id"))
    .bind(text_field(&record.fields, "notes"))
    .bind(record.created_at)
    .bind(record.updated_at)
    .bind(text_field(&record.fields, "store_id"))
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite a sale's business fields and timestamps.
pub async fn update_sale_fields(
    pool: &Pool,
    record: &RecordData,
    status: SyncStatus,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE sales SET
            bill_number = ?, customer_name = ?, customer_phone = ?, subtotal = ?,
            discount_amount = ?, tax_amount = ?, total_amount = ?, payment_method = ?,
            payment_status = ?, staff_id = ?, notes = ?, updated_at = ?, store_id = ?,
            sync_status = ?
         WHERE id = ?",
    )
    .bind(text_field(&record.fields, "bill_number"))
    .bind(text_field(&record.fields, "customer_name"))
    .bind(text_field(&record.fields, "customer_phone"))
    .bind(num_field(&record.fields, "subtotal"))
    .bind(num_field(&record.fields, "discount_amount"))
    .bind(num_field(&record.fields, "tax_amount"))
    .bind(num_field(&record.fields, "total_amount"))
    .bind(text_field(&record.fields, "payment_method"))
    .bind(text_field(&record.fields, "payment_status"))
    .bind(text_field(&record.fields, "staff_id"))
    .bind(text_field(&record.fields, "notes"))
    .bind(record.updated_at)
    .bind(text_field(&record.fields, "store_id"))
    .bind(status.as_str())
    .bind(&record.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("sale {}", record.id)));
    }
    Ok(())
}

/// Items of one sale, in insertion order.
pub async fn list_sale_items(pool: &Pool, sale_id: &str) -> Result<Vec<SaleItemRow>> {
    let query = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ? ORDER BY id");
    Ok(sqlx::query_as::<_, SaleItemRow>(&query)
        .bind(sale_id)
        .fetch_all(pool)
        .await?)
}

/// Items of one sale in engine shape, for pushing.
pub async fn list_sale_item_records(pool: &Pool, sale_id: &str) -> Result<Vec<RecordData>> {
    Ok(list_sale_items(pool, sale_id)
        .await?
        .iter()
        .map(SaleItemRow::to_record_data)
        .collect())
}

/// Replace a sale's items with the remote set. Items are immutable once
/// created, so replication is delete-then-reinsert.
pub async fn replace_sale_items(
    pool: &Pool,
    sale_id: &str,
    items: &[RecordData],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM sale_items WHERE sale_id = ?")
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

    for item in items {
        let product_id = required_text_field(&item.fields, "product_id", &item.id)?;
        sqlx::query(
            "INSERT INTO sale_items (
                id, sale_id, product_id, quantity, unit_price, discount_amount,
                tax_amount, total_price, created_at, sync_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'synced')",
        )
        .bind(&item.id)
        .bind(sale_id)
        .bind(product_id)
        .bind(num_field(&item.fields, "quantity"))
        .bind(num_field(&item.fields, "unit_price"))
        .bind(num_field(&item.fields, "discount_amount"))
        .bind(num_field(&item.fields, "tax_amount"))
        .bind(num_field(&item.fields, "total_price"))
        .bind(item.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// One line of a new sale.
#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
}

/// A sale as captured at the counter.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub id: String,
    pub bill_number: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub payment_method: String,
    pub payment_status: String,
    pub staff_id: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewSaleItem>,
}

/// Record a sale: the sale row, its items, the stock deductions, and the
/// stock-movement audit rows, all in one transaction. Any item without
/// enough stock fails with `InsufficientStock` and rolls everything back.
pub async fn record_sale(
    pool: &Pool,
    sale: &NewSale,
    store_id: &str,
    now: Timestamp,
) -> Result<()> {
    let subtotal: f64 = sale
        .items
        .iter()
        .map(|item| item.quantity * item.unit_price)
        .sum();
    let discount: f64 = sale.items.iter().map(|item| item.discount_amount).sum();
    let tax: f64 = sale.items.iter().map(|item| item.tax_amount).sum();
    let total = subtotal - discount + tax;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO sales (
            id, bill_number, customer_name, customer_phone, subtotal, discount_amount,
            tax_amount, total_amount, payment_method, payment_status, staff_id, notes,
            created_at, updated_at, store_id, sync_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
    )
    .bind(&sale.id)
    .bind(&sale.bill_number)
    .bind(&sale.customer_name)
    .bind(&sale.customer_phone)
    .bind(subtotal)
    .bind(discount)
    .bind(tax)
    .bind(total)
    .bind(&sale.payment_method)
    .bind(&sale.payment_status)
    .bind(&sale.staff_id)
    .bind(&sale.notes)
    .bind(now)
    .bind(now)
    .bind(store_id)
    .execute(&mut *tx)
    .await?;

    for item in &sale.items {
        let stock: Option<f64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?")
                .bind(&item.product_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(stock) = stock else {
            return Err(SyncError::NotFound(format!("product {}", item.product_id)));
        };
        if stock < item.quantity {
            return Err(SyncError::InsufficientStock(item.product_id.clone()));
        }

        sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity - ?, updated_at = ?, \
             sync_status = 'pending' WHERE id = ?",
        )
        .bind(item.quantity)
        .bind(now)
        .bind(&item.product_id)
        .execute(&mut *tx)
        .await?;

        let total_price = item.quantity * item.unit_price - item.discount_amount
            + item.tax_amount;
        sqlx::query(
            "INSERT INTO sale_items (
                id, sale_id, product_id, quantity, unit_price, discount_amount,
                tax_amount, total_price, created_at, sync_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&sale.id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount_amount)
        .bind(item.tax_amount)
        .bind(total_price)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO stock_movements (
                id, product_id, movement_type, quantity, reference_type, reference_id,
                notes, created_at, store_id, sync_status
            ) VALUES (?, ?, 'sale', ?, 'sale', ?, NULL, ?, ?, 'pending')",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&item.product_id)
        .bind(-item.quantity)
        .bind(&sale.id)
        .bind(now)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, products};
    use serde_json::json;

    fn product(id: &str, stock: f64) -> RecordData {
        RecordData::new(id, 0, 0)
            .with_field("name", json!("Beans"))
            .with_field("selling_price", json!(10.0))
            .with_field("stock_quantity", json!(stock))
    }

    fn sale_record(id: &str, updated_at: i64) -> RecordData {
        RecordData::new(id, 1_000, updated_at)
            .with_field("bill_number", json!("B-001"))
            .with_field("total_amount", json!(20.0))
            .with_field("payment_method", json!("cash"))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let pool = create_memory_pool().await.unwrap();
        insert_sale(&pool, &sale_record("s1", 2_000), SyncStatus::Pending)
            .await
            .unwrap();

        let row = get_sale(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(row.bill_number.as_deref(), Some("B-001"));
        assert_eq!(row.total_amount, 20.0);
        assert_eq!(row.sync_status, "pending");
    }

    #[tokio::test]
    async fn replace_items_is_a_full_swap() {
        let pool = create_memory_pool().await.unwrap();
        insert_sale(&pool, &sale_record("s1", 2_000), SyncStatus::Synced)
            .await
            .unwrap();

        let first = vec![RecordData::new("i1", 1_000, 1_000)
            .with_field("product_id", json!("p1"))
            .with_field("quantity", json!(2.0))
            .with_field("unit_price", json!(10.0))
            .with_field("total_price", json!(20.0))];
        replace_sale_items(&pool, "s1", &first).await.unwrap();

        let second = vec![
            RecordData::new("i2", 1_500, 1_500)
                .with_field("product_id", json!("p2"))
                .with_field("quantity", json!(1.0))
                .with_field("unit_price", json!(5.0))
                .with_field("total_price", json!(5.0)),
            RecordData::new("i3", 1_500, 1_500)
                .with_field("product_id", json!("p3"))
                .with_field("quantity", json!(3.0))
                .with_field("unit_price", json!(1.0))
                .with_field("total_price", json!(3.0)),
        ];
        replace_sale_items(&pool, "s1", &second).await.unwrap();

        let items = list_sale_items(&pool, "s1").await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i2", "i3"]);
        assert_eq!(items[0].sync_status, "synced");
    }

    #[tokio::test]
    async fn record_sale_decrements_stock_and_audits() {
        let pool = create_memory_pool().await.unwrap();
        products::insert_product(&pool, &product("p1", 10.0), SyncStatus::Synced)
            .await
            .unwrap();

        let sale = NewSale {
            id: "s1".to_string(),
            bill_number: "B-001".to_string(),
            customer_name: None,
            customer_phone: None,
            payment_method: "cash".to_string(),
            payment_status: "paid".to_string(),
            staff_id: None,
            notes: None,
            items: vec![NewSaleItem {
                product_id: "p1".to_string(),
                quantity: 4.0,
                unit_price: 10.0,
                discount_amount: 0.0,
                tax_amount: 2.0,
            }],
        };
        record_sale(&pool, &sale, "store-1", 5_000).await.unwrap();

        let sale_row = get_sale(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(sale_row.subtotal, 40.0);
        assert_eq!(sale_row.total_amount, 42.0);
        assert_eq!(sale_row.sync_status, "pending");

        let product_row = products::get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(product_row.stock_quantity, 6.0);
        assert_eq!(product_row.sync_status, "pending");

        let movements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE reference_id = 's1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(movements, 1);
    }

    #[tokio::test]
    async fn record_sale_insufficient_stock_rolls_back_everything() {
        let pool = create_memory_pool().await.unwrap();
        products::insert_product(&pool, &product("p1", 10.0), SyncStatus::Synced)
            .await
            .unwrap();
        products::insert_product(&pool, &product("p2", 1.0), SyncStatus::Synced)
            .await
            .unwrap();

        let sale = NewSale {
            id: "s1".to_string(),
            bill_number: "B-001".to_string(),
            customer_name: None,
            customer_phone: None,
            payment_method: "cash".to_string(),
            payment_status: "paid".to_string(),
            staff_id: None,
            notes: None,
            items: vec![
                NewSaleItem {
                    product_id: "p1".to_string(),
                    quantity: 4.0,
                    unit_price: 10.0,
                    discount_amount: 0.0,
                    tax_amount: 0.0,
                },
                NewSaleItem {
                    product_id: "p2".to_string(),
                    quantity: 5.0,
                    unit_price: 1.0,
                    discount_amount: 0.0,
                    tax_amount: 0.0,
                },
            ],
        };
        let err = record_sale(&pool, &sale, "store-1", 5_000).await.unwrap_err();
        assert!(matches!(err, SyncError::InsufficientStock(_)));

        // Nothing from the aborted transaction is visible
        assert!(get_sale(&pool, "s1").await.unwrap().is_none());
        let p1 = products::get_product(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(p1.stock_quantity, 10.0);
        assert_eq!(p1.sync_status, "synced");
        let movements: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(movements, 0);
    }
}
