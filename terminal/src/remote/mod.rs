//! Remote store collaborator: the backend's typed collection surface.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use crate::error::Result;
use async_trait::async_trait;
use till_engine::{EntityKind, RecordData, Timestamp};

/// The backend's collection surface, as the sync engines consume it.
///
/// Implementations map records to and from their wire shape; the engines
/// only ever see [`RecordData`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap connectivity probe. Never errors; unreachable is `false`.
    async fn is_reachable(&self) -> bool;

    /// Records of a kind updated strictly after the watermark, oldest
    /// first. `None` fetches the whole collection.
    async fn list_since(
        &self,
        kind: EntityKind,
        since: Option<Timestamp>,
    ) -> Result<Vec<RecordData>>;

    /// How many records `list_since` would return.
    async fn count_since(&self, kind: EntityKind, since: Option<Timestamp>) -> Result<u64>;

    /// Fetch one record by id.
    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<RecordData>>;

    /// Idempotent write keyed by the record's id.
    async fn upsert(&self, kind: EntityKind, record: &RecordData) -> Result<()>;

    /// Line items of one sale.
    async fn list_sale_items(&self, sale_id: &str) -> Result<Vec<RecordData>>;

    /// Replace one sale's line items with the given set.
    async fn upsert_sale_items(&self, sale_id: &str, items: &[RecordData]) -> Result<()>;
}
