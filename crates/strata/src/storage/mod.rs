//! Tiered storage
//!
//! Three backing stores of differing cost share the [`TierBackend`] contract:
//! a byte-budgeted core block store, an ordered warm store and a LanceDB cold
//! archive. [`TierStore`] places records across them and migrates records as
//! their access patterns change; [`TierScheduler`] drains migrations in the
//! background.

pub mod block;
pub mod eviction;
pub mod filter;
pub mod lance;
pub mod scheduler;
pub mod snapshot;
pub mod tiers;
pub mod warm;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::MemoryRecord;

pub use block::BlockStore;
pub use eviction::{EvictionPolicy, WarmEvictionConfig, select_warm_evictions};
pub use filter::RecordFilter;
pub use lance::ColdStore;
pub use scheduler::{CycleReport, SchedulerStats, TierScheduler};
pub use tiers::{
    Placement, StoreRequest, TierConfig, TierStats, TierStore, TierStoreStats, initial_tier,
};
pub use warm::WarmStore;

/// Minimal contract every backing store satisfies
///
/// Writers take `&mut self`; the [`TierStore`] guards each backend with its own
/// `RwLock` so reads proceed concurrently while writes to one tier serialize.
#[async_trait]
pub trait TierBackend: Send + Sync {
    /// Insert or replace a record
    async fn put(&mut self, record: &MemoryRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>>;

    /// Remove a record, returning whether it was present
    async fn delete(&mut self, id: Uuid) -> Result<bool>;

    /// Every record held by this backend
    async fn scan(&self) -> Result<Vec<MemoryRecord>>;

    /// Records matching a filter
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        let records = self.scan().await?;
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn len(&self) -> Result<usize>;

    /// Aggregate content size in bytes
    async fn total_bytes(&self) -> Result<u64>;

    async fn contains(&self, id: Uuid) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }
}
