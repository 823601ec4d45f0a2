//! In-memory remote store, used by tests and offline development.
//!
//! Supports fault injection: the store can be made unreachable, individual
//! record upserts can be rejected, and artificial latency can be added to
//! keep a cycle in flight.

use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use till_engine::{EntityKind, RecordData, Timestamp};

/// A remote store held entirely in memory.
pub struct MemoryRemoteStore {
    records: Mutex<BTreeMap<(EntityKind, String), RecordData>>,
    sale_items: Mutex<BTreeMap<String, Vec<RecordData>>>,
    reachable: AtomicBool,
    rejected_ids: Mutex<BTreeSet<String>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            sale_items: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            rejected_ids: Mutex::new(BTreeSet::new()),
            latency: Mutex::new(None),
        }
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle connectivity; while unreachable every call fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Reject upserts of one record id with a write-rejection error.
    pub fn reject_upserts_for(&self, id: impl Into<String>) {
        self.rejected_ids.lock().unwrap().insert(id.into());
    }

    /// Accept upserts of all record ids again.
    pub fn clear_rejections(&self) {
        self.rejected_ids.lock().unwrap().clear();
    }

    /// Add artificial latency to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Put a record into the store directly, bypassing fault injection.
    pub fn seed(&self, kind: EntityKind, record: RecordData) {
        self.records
            .lock()
            .unwrap()
            .insert((kind, record.id.clone()), record);
    }

    /// Put sale items into the store directly.
    pub fn seed_sale_items(&self, sale_id: impl Into<String>, items: Vec<RecordData>) {
        self.sale_items.lock().unwrap().insert(sale_id.into(), items);
    }

    /// Read a record back, for assertions.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<RecordData> {
        self.records
            .lock()
            .unwrap()
            .get(&(kind, id.to_string()))
            .cloned()
    }

    /// Read one sale's items back, for assertions.
    pub fn get_sale_items(&self, sale_id: &str) -> Vec<RecordData> {
        self.sale_items
            .lock()
            .unwrap()
            .get(sale_id)
            .cloned()
            .unwrap_or_default()
    }

    /// How many records of a kind the store holds.
    pub fn record_count(&self, kind: EntityKind) -> usize {
        self.records
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    async fn simulate(&self) -> Result<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::Connectivity(
                "in-memory remote is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn is_reachable(&self) -> bool {
        self.simulate().await.is_ok()
    }

    async fn list_since(
        &self,
        kind: EntityKind,
        since: Option<Timestamp>,
    ) -> Result<Vec<RecordData>> {
        self.simulate().await?;
        let records = self.records.lock().unwrap();
        let mut matching: Vec<RecordData> = records
            .iter()
            .filter(|((k, _), record)| {
                *k == kind && since.is_none_or(|since| record.updated_at > since)
            })
            .map(|(_, record)| record.clone())
            .collect();
        matching.sort_by_key(|record| record.updated_at);
        Ok(matching)
    }

    async fn count_since(&self, kind: EntityKind, since: Option<Timestamp>) -> Result<u64> {
        Ok(self.list_since(kind, since).await?.len() as u64)
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<RecordData>> {
        self.simulate().await?;
        Ok(self.get(kind, id))
    }

    async fn upsert(&self, kind: EntityKind, record: &RecordData) -> Result<()> {
        self.simulate().await?;
        if self.rejected_ids.lock().unwrap().contains(&record.id) {
            return Err(SyncError::WriteRejected(format!(
                "upsert of {} rejected",
                record.id
            )));
        }
        self.records
            .lock()
            .unwrap()
            .insert((kind, record.id.clone()), record.clone());
        Ok(())
    }

    async fn list_sale_items(&self, sale_id: &str) -> Result<Vec<RecordData>> {
        self.simulate().await?;
        Ok(self.get_sale_items(sale_id))
    }

    async fn upsert_sale_items(&self, sale_id: &str, items: &[RecordData]) -> Result<()> {
        self.simulate().await?;
        self.sale_items
            .lock()
            .unwrap()
            .insert(sale_id.to_string(), items.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, updated_at: i64) -> RecordData {
        RecordData::new(id, 0, updated_at).with_field("name", json!("Beans"))
    }

    #[tokio::test]
    async fn upsert_and_list_since() {
        let remote = MemoryRemoteStore::new();
        remote
            .upsert(EntityKind::Product, &record("p1", 1_000))
            .await
            .unwrap();
        remote
            .upsert(EntityKind::Product, &record("p2", 2_000))
            .await
            .unwrap();

        let all = remote.list_since(EntityKind::Product, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "p1");

        // Strictly-after semantics: the boundary record is not re-fetched
        let newer = remote
            .list_since(EntityKind::Product, Some(1_000))
            .await
            .unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, "p2");

        assert_eq!(
            remote
                .count_since(EntityKind::Product, Some(1_000))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_call() {
        let remote = MemoryRemoteStore::new();
        remote.set_reachable(false);
        assert!(!remote.is_reachable().await);
        assert!(matches!(
            remote.list_since(EntityKind::Product, None).await,
            Err(SyncError::Connectivity(_))
        ));
    }

    #[tokio::test]
    async fn rejected_upserts_fail_per_record() {
        let remote = MemoryRemoteStore::new();
        remote.reject_upserts_for("p1");

        let err = remote
            .upsert(EntityKind::Product, &record("p1", 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::WriteRejected(_)));

        remote
            .upsert(EntityKind::Product, &record("p2", 1_000))
            .await
            .unwrap();
        assert_eq!(remote.record_count(EntityKind::Product), 1);
    }
}
