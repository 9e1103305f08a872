//! Core tier: a small byte-budgeted block store
//!
//! Holds records in memory with a per-record size limit and an aggregate byte
//! budget. Writes that would exceed either are refused with
//! [`StrataError::Capacity`]. When opened on a path, every write is mirrored to
//! a JSON snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::types::MemoryRecord;
use crate::storage::{TierBackend, snapshot};

pub struct BlockStore {
    records: HashMap<Uuid, MemoryRecord>,
    used_bytes: u64,
    max_record_bytes: u64,
    max_total_bytes: u64,
    snapshot_path: Option<PathBuf>,
    /// Records loaded from a snapshot that no longer fit the budget
    overflow: Vec<MemoryRecord>,
}

impl BlockStore {
    /// A volatile store with no snapshot
    pub fn in_memory(max_record_bytes: u64, max_total_bytes: u64) -> Self {
        Self {
            records: HashMap::new(),
            used_bytes: 0,
            max_record_bytes,
            max_total_bytes,
            snapshot_path: None,
            overflow: Vec::new(),
        }
    }

    /// Open a store backed by the snapshot at `path`
    ///
    /// Records that no longer fit the configured limits (the limits were lowered
    /// since the snapshot was written) are set aside; collect them with
    /// [`BlockStore::take_overflow`].
    pub async fn open(path: &Path, max_record_bytes: u64, max_total_bytes: u64) -> Result<Self> {
        let mut store = Self::in_memory(max_record_bytes, max_total_bytes);
        store.snapshot_path = Some(path.to_path_buf());

        let mut loaded: Vec<MemoryRecord> = snapshot::load(path).await?.unwrap_or_default();
        // Smallest first so the most records stay in core
        loaded.sort_by(|a, b| {
            a.content_bytes()
                .cmp(&b.content_bytes())
                .then_with(|| a.id.cmp(&b.id))
        });

        for record in loaded {
            let size = record.content_bytes();
            if size > max_record_bytes || store.used_bytes + size > max_total_bytes {
                store.overflow.push(record);
            } else {
                store.used_bytes += size;
                store.records.insert(record.id, record);
            }
        }

        if !store.overflow.is_empty() {
            warn!(
                count = store.overflow.len(),
                "Core snapshot exceeds current limits; overflow will be moved out"
            );
        }

        Ok(store)
    }

    /// Drain records that did not fit on open
    pub fn take_overflow(&mut self) -> Vec<MemoryRecord> {
        std::mem::take(&mut self.overflow)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_bytes
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn sorted_records(&self) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    async fn persist(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => snapshot::save(path, &self.sorted_records()).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TierBackend for BlockStore {
    async fn put(&mut self, record: &MemoryRecord) -> Result<()> {
        let size = record.content_bytes();
        if size > self.max_record_bytes {
            return Err(StrataError::Capacity(format!(
                "Record {} is {size} bytes, core limit is {} per record",
                record.id, self.max_record_bytes
            )));
        }

        let existing = self
            .records
            .get(&record.id)
            .map(MemoryRecord::content_bytes)
            .unwrap_or(0);
        let new_total = self.used_bytes - existing + size;
        if new_total > self.max_total_bytes {
            return Err(StrataError::Capacity(format!(
                "Core budget exhausted: {new_total} of {} bytes",
                self.max_total_bytes
            )));
        }

        let previous = self.records.insert(record.id, record.clone());
        let previous_used = self.used_bytes;
        self.used_bytes = new_total;

        if let Err(e) = self.persist().await {
            match previous {
                Some(prev) => self.records.insert(prev.id, prev),
                None => self.records.remove(&record.id),
            };
            self.used_bytes = previous_used;
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
        self.used_bytes -= removed.content_bytes();

        if let Err(e) = self.persist().await {
            self.used_bytes += removed.content_bytes();
            self.records.insert(id, removed);
            return Err(e);
        }
        Ok(true)
    }

    async fn scan(&self) -> Result<Vec<MemoryRecord>> {
        Ok(self.sorted_records())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn total_bytes(&self) -> Result<u64> {
        Ok(self.used_bytes)
    }

    async fn contains(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.contains_key(&id))
    }
}
