//! Entity kinds and their field catalogs.
//!
//! The sync engine operates over a closed set of business entity kinds
//! rather than open-ended table names. Each kind carries a static catalog
//! describing how its fields are typed for comparison and how much a
//! divergence in each field matters.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Field types used for typed comparison and merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Numeric,
    Date,
    Boolean,
    Text,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Numeric => write!(f, "numeric"),
            FieldType::Date => write!(f, "date"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Text => write!(f, "text"),
        }
    }
}

/// How much a divergence in a field matters.
///
/// Ordering is significant: a conflict's severity is the maximum impact
/// across its differing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
            Impact::Critical => write!(f, "critical"),
        }
    }
}

/// The business entities replicated between a terminal and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Catalog item
    Product,
    /// A completed sale, owning line-item children
    Sale,
    /// Stock adjustment audit row, immutable once created
    StockMovement,
}

impl EntityKind {
    /// All kinds in sync order. Products first so sales and movements can
    /// reference them on a freshly seeded terminal.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Product,
        EntityKind::Sale,
        EntityKind::StockMovement,
    ];

    /// The table this kind lives in, locally and on the remote.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Sale => "sales",
            EntityKind::StockMovement => "stock_movements",
        }
    }

    /// Resolve a table name back to a kind.
    pub fn from_table_name(name: &str) -> Result<Self> {
        match name {
            "products" => Ok(EntityKind::Product),
            "sales" => Ok(EntityKind::Sale),
            "stock_movements" => Ok(EntityKind::StockMovement),
            other => Err(Error::UnknownTable(other.to_string())),
        }
    }

    /// Immutable kinds are never updated after creation; pull skips
    /// existing rows and conflict resolution never rewrites them.
    pub fn is_immutable(self) -> bool {
        matches!(self, EntityKind::StockMovement)
    }

    /// Sales carry line items replicated as a full replace-set.
    pub fn has_line_items(self) -> bool {
        matches!(self, EntityKind::Sale)
    }

    /// Fields excluded from diffing: identity and replication bookkeeping.
    pub fn is_system_field(field: &str) -> bool {
        matches!(field, "id" | "sync_status")
    }

    /// How a field of this kind is compared and merged.
    pub fn field_type(self, field: &str) -> FieldType {
        match self {
            EntityKind::Product => match field {
                "cost_price" | "selling_price" | "tax_rate" | "stock_quantity"
                | "min_stock_level" => FieldType::Numeric,
                "created_at" | "updated_at" => FieldType::Date,
                "is_active" => FieldType::Boolean,
                _ => FieldType::Text,
            },
            EntityKind::Sale => match field {
                "subtotal" | "discount_amount" | "tax_amount" | "total_amount" => {
                    FieldType::Numeric
                }
                "created_at" | "updated_at" => FieldType::Date,
                _ => FieldType::Text,
            },
            EntityKind::StockMovement => match field {
                "quantity" => FieldType::Numeric,
                "created_at" => FieldType::Date,
                _ => FieldType::Text,
            },
        }
    }

    /// How much a divergence in a field of this kind matters.
    pub fn field_impact(self, field: &str) -> Impact {
        match self {
            EntityKind::Product => match field {
                "sku" => Impact::Critical,
                "selling_price" | "stock_quantity" => Impact::High,
                "cost_price" | "tax_rate" | "min_stock_level" => Impact::Medium,
                _ => Impact::Low,
            },
            EntityKind::Sale => match field {
                "bill_number" => Impact::Critical,
                "total_amount" => Impact::High,
                "subtotal" | "discount_amount" | "tax_amount" | "payment_status" => {
                    Impact::Medium
                }
                _ => Impact::Low,
            },
            EntityKind::StockMovement => match field {
                "quantity" => Impact::High,
                "product_id" | "movement_type" => Impact::Medium,
                _ => Impact::Low,
            },
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_table_name(kind.table_name()).unwrap(), kind);
        }
        assert!(EntityKind::from_table_name("customers").is_err());
    }

    #[test]
    fn impact_ordering() {
        assert!(Impact::Low < Impact::Medium);
        assert!(Impact::Medium < Impact::High);
        assert!(Impact::High < Impact::Critical);
    }

    #[test]
    fn product_field_catalog() {
        let kind = EntityKind::Product;
        assert_eq!(kind.field_type("selling_price"), FieldType::Numeric);
        assert_eq!(kind.field_type("is_active"), FieldType::Boolean);
        assert_eq!(kind.field_type("description"), FieldType::Text);
        assert_eq!(kind.field_impact("sku"), Impact::Critical);
        assert_eq!(kind.field_impact("selling_price"), Impact::High);
        assert_eq!(kind.field_impact("cost_price"), Impact::Medium);
        assert_eq!(kind.field_impact("description"), Impact::Low);
    }

    #[test]
    fn sale_field_catalog() {
        let kind = EntityKind::Sale;
        assert_eq!(kind.field_type("total_amount"), FieldType::Numeric);
        assert_eq!(kind.field_impact("bill_number"), Impact::Critical);
        assert_eq!(kind.field_impact("total_amount"), Impact::High);
        assert_eq!(kind.field_impact("payment_status"), Impact::Medium);
        assert_eq!(kind.field_impact("notes"), Impact::Low);
    }

    #[test]
    fn movement_properties() {
        assert!(EntityKind::StockMovement.is_immutable());
        assert!(!EntityKind::Product.is_immutable());
        assert!(EntityKind::Sale.has_line_items());
        assert!(!EntityKind::Product.has_line_items());
    }

    #[test]
    fn system_fields_excluded() {
        assert!(EntityKind::is_system_field("id"));
        assert!(EntityKind::is_system_field("sync_status"));
        assert!(!EntityKind::is_system_field("name"));
    }

    #[test]
    fn kind_serialization() {
        let json = serde_json::to_string(&EntityKind::StockMovement).unwrap();
        assert_eq!(json, "\"stock_movement\"");
        let parsed: EntityKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EntityKind::StockMovement);
    }
}
