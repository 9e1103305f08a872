//! Warm tier: an ordered key-value store with a write-through JSON snapshot
//!
//! The warm tier has no byte budget; its entry count is bounded by the
//! eviction pass in [`crate::storage::eviction`], which moves records to cold.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::MemoryRecord;
use crate::storage::{TierBackend, snapshot};

/// Ordered in-memory map mirrored to a JSON snapshot
///
/// Every `put` and `delete` rewrites the whole snapshot, so a write costs
/// O(entries). The tier is sized for the bounded entry count enforced by warm
/// eviction (`tiers.warm.max_entries`, default 1000); larger working sets
/// belong in cold.
#[derive(Default)]
pub struct WarmStore {
    records: BTreeMap<Uuid, MemoryRecord>,
    total_bytes: u64,
    snapshot_path: Option<PathBuf>,
}

impl WarmStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let loaded: Vec<MemoryRecord> = snapshot::load(path).await?.unwrap_or_default();

        let mut store = Self {
            snapshot_path: Some(path.to_path_buf()),
            ..Self::default()
        };
        for record in loaded {
            store.total_bytes += record.content_bytes();
            store.records.insert(record.id, record);
        }
        Ok(store)
    }

    async fn persist(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => {
                let records: Vec<&MemoryRecord> = self.records.values().collect();
                snapshot::save(path, &records).await
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TierBackend for WarmStore {
    async fn put(&mut self, record: &MemoryRecord) -> Result<()> {
        let previous = self.records.insert(record.id, record.clone());
        let previous_bytes = self.total_bytes;
        self.total_bytes = self.total_bytes
            - previous.as_ref().map(MemoryRecord::content_bytes).unwrap_or(0)
            + record.content_bytes();

        if let Err(e) = self.persist().await {
            match previous {
                Some(prev) => self.records.insert(prev.id, prev),
                None => self.records.remove(&record.id),
            };
            self.total_bytes = previous_bytes;
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self.records.get(&id).cloned())
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool> {
        let Some(removed) = self.records.remove(&id) else {
            return Ok(false);
        };
        self.total_bytes -= removed.content_bytes();

        if let Err(e) = self.persist().await {
            self.total_bytes += removed.content_bytes();
            self.records.insert(id, removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn scan(&self) -> Result<Vec<MemoryRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn total_bytes(&self) -> Result<u64> {
        Ok(self.total_bytes)
    }

    async fn contains(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.contains_key(&id))
    }
}
