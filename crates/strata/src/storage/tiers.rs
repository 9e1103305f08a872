//! Tier placement and migration
//!
//! [`TierStore`] owns the three backing stores, chooses where new records land,
//! turns access patterns into promotion/demotion requests and executes
//! single-step migrations between neighbouring tiers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::access::{
    AccessOutcome, AccessPattern, AccessPatternTracker, AccessStats, ScoreThresholds,
};
use crate::memory::types::{Category, MemoryRecord, MigrationDirection, StorageTier};
use crate::search::engine::RecordLookup;
use crate::storage::eviction::{WarmEvictionConfig, select_warm_evictions};
use crate::storage::{BlockStore, ColdStore, RecordFilter, TierBackend, WarmStore};

const CORE_SNAPSHOT: &str = "core.json";
const WARM_SNAPSHOT: &str = "warm.json";
const COLD_DIR: &str = "cold";

/// Preference records shorter than this many characters start in core
pub const CORE_PREFERENCE_MAX_CHARS: usize = 200;
/// Records longer than this many characters start in cold
pub const COLD_MIN_CHARS: usize = 1000;

/// Capacity limits and thresholds for the three tiers
#[derive(Debug, Clone, PartialEq)]
pub struct TierConfig {
    /// Largest single record the core tier accepts (default: 4096 bytes)
    pub core_max_record_bytes: u64,
    /// Aggregate core budget (default: 1 MiB)
    pub core_max_total_bytes: u64,
    pub warm: WarmEvictionConfig,
    /// Aggregate cold budget (default: 1 GiB)
    pub cold_max_total_bytes: u64,
    pub thresholds: ScoreThresholds,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            core_max_record_bytes: 4096,
            core_max_total_bytes: 1024 * 1024,
            warm: WarmEvictionConfig::default(),
            cold_max_total_bytes: 1024 * 1024 * 1024,
            thresholds: ScoreThresholds::default(),
        }
    }
}

impl TierConfig {
    /// Reject limits the tiers cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(StrataError::Config(msg));

        if self.core_max_record_bytes == 0 || self.core_max_total_bytes == 0 {
            return invalid("core tier capacities must be non-zero".to_string());
        }
        if self.core_max_record_bytes > self.core_max_total_bytes {
            return invalid(format!(
                "core max_record_bytes ({}) exceeds max_total_bytes ({})",
                self.core_max_record_bytes, self.core_max_total_bytes
            ));
        }
        if self.warm.max_entries == 0 {
            return invalid("warm tier max_entries must be non-zero".to_string());
        }
        if self.cold_max_total_bytes == 0 {
            return invalid("cold tier max_total_bytes must be non-zero".to_string());
        }
        self.thresholds.validate()
    }
}

/// Initial placement decision table, evaluated in order
///
/// 1. preference shorter than 200 chars → core
/// 2. system or preference → warm
/// 3. longer than 1000 chars → cold
/// 4. everything else → warm
pub fn initial_tier(category: Category, content: &str) -> StorageTier {
    let chars = content.chars().count();
    match category {
        Category::Preference if chars < CORE_PREFERENCE_MAX_CHARS => StorageTier::Core,
        Category::System | Category::Preference => StorageTier::Warm,
        _ if chars > COLD_MIN_CHARS => StorageTier::Cold,
        _ => StorageTier::Warm,
    }
}

/// A request to store a new record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub content: String,
    pub category: Category,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>, category: Category) -> Self {
        Self {
            content: content.into(),
            category,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            project_id: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Where a stored record landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: Uuid,
    pub tier: StorageTier,
}

/// Per-tier size snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub tier: StorageTier,
    pub records: usize,
    pub bytes: u64,
    /// Byte budget, when the tier has one
    pub capacity_bytes: Option<u64>,
    /// Entry limit, when the tier has one
    pub max_entries: Option<usize>,
}

/// Statistics across all tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStoreStats {
    pub tiers: Vec<TierStats>,
    pub access: AccessStats,
    pub pending_promotions: usize,
    pub pending_demotions: usize,
}

impl TierStoreStats {
    pub fn total_records(&self) -> usize {
        self.tiers.iter().map(|t| t.records).sum()
    }

    pub fn tier(&self, tier: StorageTier) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.tier == tier)
    }
}

/// FIFO queue that holds each id at most once
#[derive(Debug, Default)]
struct PendingQueue {
    order: VecDeque<Uuid>,
    members: HashSet<Uuid>,
}

impl PendingQueue {
    fn push(&mut self, id: Uuid) -> bool {
        if self.members.insert(id) {
            self.order.push_back(id);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, id: &Uuid) {
        if self.members.remove(id) {
            self.order.retain(|queued| queued != id);
        }
    }

    fn drain(&mut self, max: usize) -> Vec<Uuid> {
        let n = max.min(self.order.len());
        let drained: Vec<Uuid> = self.order.drain(..n).collect();
        for id in &drained {
            self.members.remove(id);
        }
        drained
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Default)]
struct MigrationQueues {
    promote: PendingQueue,
    demote: PendingQueue,
}

impl MigrationQueues {
    fn queue_mut(&mut self, direction: MigrationDirection) -> &mut PendingQueue {
        match direction {
            MigrationDirection::Promote => &mut self.promote,
            MigrationDirection::Demote => &mut self.demote,
        }
    }

    fn enqueue(&mut self, id: Uuid, direction: MigrationDirection) -> bool {
        let (target, other) = match direction {
            MigrationDirection::Promote => (&mut self.promote, &mut self.demote),
            MigrationDirection::Demote => (&mut self.demote, &mut self.promote),
        };
        other.remove(&id);
        target.push(id)
    }

    fn forget(&mut self, id: &Uuid) {
        self.promote.remove(id);
        self.demote.remove(id);
    }
}

type Backend = RwLock<Box<dyn TierBackend>>;

/// Three-tier record store
///
/// Each tier sits behind its own `RwLock`; no operation holds two tier locks at
/// once. Migrations are serialized among themselves so a record is never moved
/// by two callers concurrently.
pub struct TierStore {
    core: Backend,
    warm: Backend,
    cold: Backend,
    tracker: AccessPatternTracker,
    queues: Mutex<MigrationQueues>,
    migrations: Mutex<()>,
    config: TierConfig,
}

impl TierStore {
    /// Open the persistent tiers under `data_dir`
    ///
    /// Core and warm are JSON snapshots, cold is a LanceDB database. Access
    /// patterns are rebuilt from the stored records.
    pub async fn open(data_dir: &Path, config: TierConfig) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
            StrataError::Storage(format!(
                "Failed to create data directory {}: {e}",
                data_dir.display()
            ))
        })?;

        let mut core = BlockStore::open(
            &data_dir.join(CORE_SNAPSHOT),
            config.core_max_record_bytes,
            config.core_max_total_bytes,
        )
        .await?;
        let overflow = core.take_overflow();
        let warm = WarmStore::open(&data_dir.join(WARM_SNAPSHOT)).await?;
        let cold = ColdStore::open(&data_dir.join(COLD_DIR), config.cold_max_total_bytes).await?;

        let store = Self::with_backends(Box::new(core), Box::new(warm), Box::new(cold), config)?;

        for record in overflow {
            debug!(id = %record.id, "Moving core overflow to warm");
            store.write(StorageTier::Warm, &record).await?;
        }

        let removed = store.reconcile_duplicates().await?;
        if removed > 0 {
            info!(removed, "Removed stale duplicate copies on open");
        }
        let rebuilt = store.rebuild_patterns().await?;
        info!(records = rebuilt, data_dir = %data_dir.display(), "Tier store opened");

        Ok(store)
    }

    /// Build a store from explicit backends; fails on an invalid `config`
    pub fn with_backends(
        core: Box<dyn TierBackend>,
        warm: Box<dyn TierBackend>,
        cold: Box<dyn TierBackend>,
        config: TierConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: RwLock::new(core),
            warm: RwLock::new(warm),
            cold: RwLock::new(cold),
            tracker: AccessPatternTracker::new(config.thresholds),
            queues: Mutex::new(MigrationQueues::default()),
            migrations: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn tracker(&self) -> &AccessPatternTracker {
        &self.tracker
    }

    fn backend(&self, tier: StorageTier) -> &Backend {
        match tier {
            StorageTier::Core => &self.core,
            StorageTier::Warm => &self.warm,
            StorageTier::Cold => &self.cold,
        }
    }

    async fn write(&self, tier: StorageTier, record: &MemoryRecord) -> Result<()> {
        self.backend(tier).write().await.put(record).await
    }

    async fn remove_from(&self, tier: StorageTier, id: Uuid) -> Result<bool> {
        self.backend(tier).write().await.delete(id).await
    }

    /// Overlay live access statistics onto a stored record
    fn with_live_stats(&self, mut record: MemoryRecord) -> MemoryRecord {
        if let Some(pattern) = self.tracker.get(&record.id) {
            record.access_count = pattern.access_count;
            record.last_accessed_at = pattern.last_accessed_at;
        }
        record
    }

    /// Store a new record and return its id
    pub async fn store(
        &self,
        content: impl Into<String>,
        category: Category,
        tags: BTreeSet<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<Uuid> {
        let request = StoreRequest {
            content: content.into(),
            category,
            tags,
            metadata,
            project_id: None,
        };
        Ok(self.store_request(request).await?.id)
    }

    /// Store a new record, reporting the tier it was placed in
    pub async fn store_request(&self, request: StoreRequest) -> Result<Placement> {
        let mut record = MemoryRecord::new(request.content, request.category)
            .with_metadata(request.metadata);
        record.tags = request.tags;
        record.project_id = request.project_id;

        let mut tier = initial_tier(record.category, &record.content);

        // Tracked before the write so a concurrent migration of the new record
        // updates its pattern
        self.tracker.track(record.id, tier, record.created_at);
        let written = match self.write(tier, &record).await {
            Err(StrataError::Capacity(reason)) if tier == StorageTier::Core => {
                info!(id = %record.id, %reason, "Core tier full, placing record in warm");
                tier = StorageTier::Warm;
                self.tracker.set_tier(record.id, tier);
                self.write(tier, &record).await
            }
            other => other,
        };
        if let Err(e) = written {
            self.tracker.remove(&record.id);
            return Err(e);
        }
        debug!(id = %record.id, %tier, category = %record.category, "Stored record");

        if tier == StorageTier::Warm {
            if let Err(e) = self.enforce_warm_capacity().await {
                warn!("Warm capacity enforcement failed after store: {e}");
            }
        }

        Ok(Placement {
            id: record.id,
            tier,
        })
    }

    /// Find a record and the tier holding it, by precedence core → warm → cold
    pub async fn locate(&self, id: Uuid) -> Result<Option<(StorageTier, MemoryRecord)>> {
        for tier in StorageTier::ALL {
            let found = self.backend(tier).read().await.get(id).await?;
            if let Some(record) = found {
                return Ok(Some((tier, record)));
            }
        }
        Ok(None)
    }

    pub async fn tier_of(&self, id: Uuid) -> Result<Option<StorageTier>> {
        for tier in StorageTier::ALL {
            if self.backend(tier).read().await.contains(id).await? {
                return Ok(Some(tier));
            }
        }
        Ok(None)
    }

    /// Look up a record with its live access statistics
    pub async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        Ok(self
            .locate(id)
            .await?
            .map(|(_, record)| self.with_live_stats(record)))
    }

    /// Record one access to `id`, queueing a migration when the score crosses a threshold
    pub async fn record_access(&self, id: Uuid) -> Result<AccessOutcome> {
        self.record_access_at(id, Utc::now()).await
    }

    pub async fn record_access_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<AccessOutcome> {
        let tier = match self.tracker.get(&id) {
            Some(pattern) => pattern.tier,
            None => self
                .tier_of(id)
                .await?
                .ok_or(StrataError::NotFound(id))?,
        };

        let outcome = self.tracker.record_access(id, tier, at);
        if let Some(direction) = outcome.migration {
            if self.queues.lock().await.enqueue(id, direction) {
                debug!(
                    %id,
                    ?direction,
                    score = outcome.pattern.promotion_score,
                    "Queued migration"
                );
            }
        }
        Ok(outcome)
    }

    /// Queue a migration directly, removing any queued migration the other way
    pub async fn enqueue(&self, id: Uuid, direction: MigrationDirection) -> bool {
        self.queues.lock().await.enqueue(id, direction)
    }

    /// Take up to `max` queued ids for one direction, oldest first
    pub async fn drain_pending(&self, direction: MigrationDirection, max: usize) -> Vec<Uuid> {
        self.queues.lock().await.queue_mut(direction).drain(max)
    }

    /// Number of queued (promotions, demotions)
    pub async fn pending(&self) -> (usize, usize) {
        let queues = self.queues.lock().await;
        (queues.promote.len(), queues.demote.len())
    }

    /// Move a record one tier in `direction`
    ///
    /// The destination is written first; the source copy is deleted only once
    /// that write succeeded. A failed destination write leaves the record where
    /// it was. A failed source delete leaves two copies, resolved by precedence
    /// until [`TierStore::reconcile_duplicates`] runs. Returns the new tier.
    pub async fn migrate(&self, id: Uuid, direction: MigrationDirection) -> Result<StorageTier> {
        self.migrate_from(id, None, direction).await
    }

    /// [`TierStore::migrate`], refused when the record has left `expected`
    async fn migrate_from(
        &self,
        id: Uuid,
        expected: Option<StorageTier>,
        direction: MigrationDirection,
    ) -> Result<StorageTier> {
        let _serialized = self.migrations.lock().await;

        let Some((source, record)) = self.locate(id).await? else {
            // Deleted after it was queued or tracked
            self.tracker.remove(&id);
            self.queues.lock().await.forget(&id);
            return Err(StrataError::NotFound(id));
        };
        if let Some(expected) = expected.filter(|&tier| tier != source) {
            return Err(StrataError::Migration(format!(
                "{id} moved from {expected} to {source} before it could be migrated"
            )));
        }
        let destination = source.step(direction).ok_or_else(|| {
            StrataError::Migration(format!(
                "Cannot {} {id}: already in {source} tier",
                match direction {
                    MigrationDirection::Promote => "promote",
                    MigrationDirection::Demote => "demote",
                }
            ))
        })?;

        let record = self.with_live_stats(record);

        self.write(destination, &record).await.map_err(|e| {
            StrataError::Migration(format!(
                "Failed to write {id} to {destination} tier: {e}"
            ))
        })?;

        if let Err(e) = self.remove_from(source, id).await {
            let visible = source.min(destination);
            self.tracker.set_tier(id, visible);
            return Err(StrataError::Migration(format!(
                "Copied {id} to {destination} but failed to remove it from {source}: {e}"
            )));
        }

        self.tracker.set_tier(id, destination);
        self.queues.lock().await.forget(&id);
        debug!(%id, from = %source, to = %destination, "Migrated record");
        Ok(destination)
    }

    /// Remove a record from every tier
    ///
    /// Serialized with migrations, so an in-flight move cannot leave a copy
    /// behind in its destination tier.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let _serialized = self.migrations.lock().await;
        let mut removed = false;
        for tier in StorageTier::ALL {
            removed |= self.remove_from(tier, id).await?;
        }
        self.tracker.remove(&id);
        self.queues.lock().await.forget(&id);
        Ok(removed)
    }

    /// Every record in one tier, with live access statistics
    pub async fn list(&self, tier: StorageTier) -> Result<Vec<MemoryRecord>> {
        let records = self.backend(tier).read().await.scan().await?;
        Ok(records
            .into_iter()
            .map(|r| self.with_live_stats(r))
            .collect())
    }

    /// Filtered query against the cold archive
    ///
    /// The filter is evaluated against the access counts stored with each row,
    /// which are refreshed on migration and on close.
    pub async fn query_cold(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        let records = self.cold.read().await.query(filter).await?;
        Ok(records
            .into_iter()
            .map(|r| self.with_live_stats(r))
            .collect())
    }

    /// Move surplus warm records to cold; returns the ids that moved
    pub async fn enforce_warm_capacity(&self) -> Result<Vec<Uuid>> {
        let count = self.warm.read().await.len().await?;
        if count <= self.config.warm.max_entries {
            return Ok(Vec::new());
        }

        let records = self.list(StorageTier::Warm).await?;
        let victims = select_warm_evictions(&records, &self.config.warm, Utc::now());

        let mut evicted = Vec::with_capacity(victims.len());
        for id in victims {
            let demoted = self
                .migrate_from(id, Some(StorageTier::Warm), MigrationDirection::Demote)
                .await;
            match demoted {
                Ok(_) => evicted.push(id),
                Err(e) => warn!(%id, "Warm eviction failed: {e}"),
            }
        }

        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                policy = %self.config.warm.policy,
                "Evicted warm records to cold"
            );
        }
        Ok(evicted)
    }

    /// Delete lower-precedence copies of ids present in more than one tier
    pub async fn reconcile_duplicates(&self) -> Result<usize> {
        let _serialized = self.migrations.lock().await;
        let mut seen: HashMap<Uuid, StorageTier> = HashMap::new();
        let mut stale: Vec<(StorageTier, Uuid)> = Vec::new();

        for tier in StorageTier::ALL {
            let records = self.backend(tier).read().await.scan().await?;
            for record in records {
                if seen.contains_key(&record.id) {
                    stale.push((tier, record.id));
                } else {
                    seen.insert(record.id, tier);
                }
            }
        }

        let mut removed = 0;
        for (tier, id) in stale {
            match self.remove_from(tier, id).await {
                Ok(true) => {
                    removed += 1;
                    if let Some(&kept) = seen.get(&id) {
                        self.tracker.set_tier(id, kept);
                    }
                    debug!(%id, %tier, "Removed stale duplicate");
                }
                Ok(false) => {}
                Err(e) => warn!(%id, %tier, "Failed to remove stale duplicate: {e}"),
            }
        }
        Ok(removed)
    }

    /// Re-score the `limit` stalest patterns and queue newly idle records for demotion
    ///
    /// Only a score that decays from at or above the demotion threshold to
    /// below it queues work. Promotions and retries of failed migrations are
    /// left to future accesses. Records that were never accessed keep their
    /// initial placement. Returns the number of demotions queued.
    pub async fn refresh_scores(&self, limit: usize) -> usize {
        let now = Utc::now();
        let demote_below = self.tracker.thresholds().demote;
        let mut queued = 0;

        for id in self.tracker.stalest(limit) {
            let previous = self.tracker.get(&id).map(|p| p.promotion_score);
            let Some(outcome) = self.tracker.rescore(id, now) else {
                continue;
            };
            if outcome.pattern.access_count == 0 {
                continue;
            }
            let crossed = previous.is_some_and(|score| score >= demote_below);
            if crossed && outcome.migration == Some(MigrationDirection::Demote) {
                if self.queues.lock().await.enqueue(id, MigrationDirection::Demote) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Rebuild every access pattern from the stored records
    pub async fn rebuild_patterns(&self) -> Result<usize> {
        self.tracker.clear();
        let now = Utc::now();

        for tier in StorageTier::ALL {
            let records = self.backend(tier).read().await.scan().await?;
            for record in records {
                if !self.tracker.contains(&record.id) {
                    self.tracker
                        .restore(AccessPattern::from_record(&record, tier, now));
                }
            }
        }
        Ok(self.tracker.len())
    }

    pub async fn stats(&self) -> Result<TierStoreStats> {
        let mut tiers = Vec::with_capacity(StorageTier::ALL.len());
        for tier in StorageTier::ALL {
            let (records, bytes) = {
                let backend = self.backend(tier).read().await;
                (backend.len().await?, backend.total_bytes().await?)
            };
            let (capacity_bytes, max_entries) = match tier {
                StorageTier::Core => (Some(self.config.core_max_total_bytes), None),
                StorageTier::Warm => (None, Some(self.config.warm.max_entries)),
                StorageTier::Cold => (Some(self.config.cold_max_total_bytes), None),
            };
            tiers.push(TierStats {
                tier,
                records,
                bytes,
                capacity_bytes,
                max_entries,
            });
        }

        let (pending_promotions, pending_demotions) = self.pending().await;
        Ok(TierStoreStats {
            tiers,
            access: self.tracker.stats(),
            pending_promotions,
            pending_demotions,
        })
    }

    /// Write live access statistics back into the stored records
    pub async fn flush_access_stats(&self) -> Result<usize> {
        let mut flushed = 0;
        for tier in StorageTier::ALL {
            let records = self.backend(tier).read().await.scan().await?;
            for record in records {
                let Some(pattern) = self.tracker.get(&record.id) else {
                    continue;
                };
                // Stores keep microsecond precision
                let micros = |t: Option<DateTime<Utc>>| t.map(|t| t.timestamp_micros());
                if pattern.access_count == record.access_count
                    && micros(pattern.last_accessed_at) == micros(record.last_accessed_at)
                {
                    continue;
                }
                let updated = self.with_live_stats(record);
                self.write(tier, &updated).await?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Persist access statistics before shutdown
    pub async fn close(&self) -> Result<()> {
        let flushed = self.flush_access_stats().await?;
        info!(flushed, "Tier store closed");
        Ok(())
    }
}

#[async_trait]
impl RecordLookup for TierStore {
    async fn tier_of(&self, id: Uuid) -> Result<Option<StorageTier>> {
        TierStore::tier_of(self, id).await
    }

    async fn record_access(&self, id: Uuid) -> Result<()> {
        TierStore::record_access(self, id).await.map(|_| ())
    }

    async fn candidates(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        for tier in StorageTier::ALL {
            if records.len() >= limit {
                break;
            }
            let mut batch = self.list(tier).await?;
            batch.truncate(limit - records.len());
            records.extend(batch);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::in_memory_store;

    mod placement {
        use super::*;

        #[test]
        fn test_decision_table() {
            assert_eq!(initial_tier(Category::Preference, "tabs"), StorageTier::Core);
            assert_eq!(
                initial_tier(Category::Preference, &"x".repeat(200)),
                StorageTier::Warm
            );
            assert_eq!(
                initial_tier(Category::System, &"x".repeat(5000)),
                StorageTier::Warm
            );
            assert_eq!(
                initial_tier(Category::Project, &"x".repeat(1001)),
                StorageTier::Cold
            );
            assert_eq!(
                initial_tier(Category::Project, &"x".repeat(1000)),
                StorageTier::Warm
            );
            assert_eq!(initial_tier(Category::Prompt, "short"), StorageTier::Warm);
        }

        #[test]
        fn test_length_counts_characters() {
            // 199 two-byte characters is 398 bytes but still under the limit
            let content = "é".repeat(199);
            assert_eq!(initial_tier(Category::Preference, &content), StorageTier::Core);
        }

        #[tokio::test]
        async fn test_store_places_and_tracks() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let placement = store
                .store_request(StoreRequest::new("x".repeat(50), Category::Preference))
                .await
                .unwrap();

            assert_eq!(placement.tier, StorageTier::Core);
            assert_eq!(store.tier_of(placement.id).await.unwrap(), Some(StorageTier::Core));

            let pattern = store.tracker().get(&placement.id).unwrap();
            assert_eq!(pattern.promotion_score, 0.0);
            assert_eq!(pattern.tier, StorageTier::Core);
        }

        #[tokio::test]
        async fn test_full_core_falls_back_to_warm() {
            let config = TierConfig {
                core_max_total_bytes: 8,
                ..TierConfig::default()
            };
            let store = in_memory_store(config).unwrap();

            let placement = store
                .store_request(StoreRequest::new("prefers light theme", Category::Preference))
                .await
                .unwrap();
            assert_eq!(placement.tier, StorageTier::Warm);
            assert_eq!(store.tracker().get(&placement.id).unwrap().tier, StorageTier::Warm);
        }
    }

    mod queues {
        use super::*;

        #[test]
        fn test_pending_queue_dedups_and_keeps_order() {
            let mut queue = PendingQueue::default();
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();

            assert!(queue.push(a));
            assert!(queue.push(b));
            assert!(!queue.push(a));
            assert_eq!(queue.drain(10), vec![a, b]);
            assert_eq!(queue.len(), 0);
        }

        #[test]
        fn test_enqueue_removes_opposite_direction() {
            let mut queues = MigrationQueues::default();
            let id = Uuid::new_v4();

            queues.enqueue(id, MigrationDirection::Promote);
            queues.enqueue(id, MigrationDirection::Demote);

            assert_eq!(queues.promote.len(), 0);
            assert_eq!(queues.demote.len(), 1);
        }

        #[test]
        fn test_drain_is_bounded() {
            let mut queue = PendingQueue::default();
            for _ in 0..5 {
                queue.push(Uuid::new_v4());
            }
            assert_eq!(queue.drain(2).len(), 2);
            assert_eq!(queue.len(), 3);
        }
    }

    mod migration {
        use super::*;

        #[tokio::test]
        async fn test_single_step_promotion() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("x".repeat(2000), Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Cold));

            let tier = store.migrate(id, MigrationDirection::Promote).await.unwrap();
            assert_eq!(tier, StorageTier::Warm);
            assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Warm));
            assert!(store.list(StorageTier::Cold).await.unwrap().is_empty());
            assert_eq!(store.tracker().get(&id).unwrap().tier, StorageTier::Warm);
        }

        #[tokio::test]
        async fn test_edge_tiers_reject_migration() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("dark mode", Category::Preference, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();

            let result = store.migrate(id, MigrationDirection::Promote).await;
            assert!(matches!(result, Err(StrataError::Migration(_))));
            assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Core));
        }

        #[tokio::test]
        async fn test_migrating_unknown_is_not_found() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let result = store
                .migrate(Uuid::new_v4(), MigrationDirection::Demote)
                .await;
            assert!(matches!(result, Err(StrataError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_migration_persists_live_stats() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("a note", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            store.record_access(id).await.unwrap();
            store.record_access(id).await.unwrap();

            store.migrate(id, MigrationDirection::Demote).await.unwrap();

            let cold = store.list(StorageTier::Cold).await.unwrap();
            assert_eq!(cold.len(), 1);
            let stored = store.cold.read().await.get(id).await.unwrap().unwrap();
            assert_eq!(stored.access_count, 2);
        }
    }

    mod access {
        use super::*;

        #[tokio::test]
        async fn test_record_access_unknown_is_not_found() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let result = store.record_access(Uuid::new_v4()).await;
            assert!(matches!(result, Err(StrataError::NotFound(_))));
        }

        #[tokio::test]
        async fn test_get_overlays_live_stats() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("a note", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();

            store.record_access(id).await.unwrap();
            let record = store.get(id).await.unwrap().unwrap();

            assert_eq!(record.access_count, 1);
            assert!(record.last_accessed_at.is_some());
        }

        #[tokio::test]
        async fn test_hot_record_is_queued_for_promotion() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("a note", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();

            for _ in 0..15 {
                store.record_access(id).await.unwrap();
            }

            assert_eq!(store.pending().await, (1, 0));
            assert_eq!(
                store.drain_pending(MigrationDirection::Promote, 10).await,
                vec![id]
            );
        }

        #[tokio::test]
        async fn test_pattern_rebuilt_for_untracked_record() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("a note", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            store.tracker().clear();

            let outcome = store.record_access(id).await.unwrap();
            assert_eq!(outcome.pattern.tier, StorageTier::Warm);
            assert_eq!(outcome.pattern.access_count, 1);
        }
    }

    mod maintenance {
        use super::*;

        #[tokio::test]
        async fn test_reconcile_keeps_highest_precedence_copy() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let record = MemoryRecord::new("duplicated", Category::Project);
            store.write(StorageTier::Warm, &record).await.unwrap();
            store.write(StorageTier::Cold, &record).await.unwrap();

            assert_eq!(store.reconcile_duplicates().await.unwrap(), 1);
            assert_eq!(store.tier_of(record.id).await.unwrap(), Some(StorageTier::Warm));
            assert!(store.list(StorageTier::Cold).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_delete_removes_everywhere() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("temporary", Category::Prompt, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            store.enqueue(id, MigrationDirection::Demote).await;

            assert!(store.delete(id).await.unwrap());
            assert!(store.get(id).await.unwrap().is_none());
            assert!(store.tracker().get(&id).is_none());
            assert_eq!(store.pending().await, (0, 0));
            assert!(!store.delete(id).await.unwrap());
        }

        #[tokio::test]
        async fn test_delete_waits_for_in_flight_migration() {
            let store = std::sync::Arc::new(in_memory_store(TierConfig::default()).unwrap());
            let id = store
                .store("moving", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();

            let in_flight = store.migrations.lock().await;
            let deleting = tokio::spawn({
                let store = std::sync::Arc::clone(&store);
                async move { store.delete(id).await }
            });
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            assert!(!deleting.is_finished());

            drop(in_flight);
            assert!(deleting.await.unwrap().unwrap());
            assert_eq!(store.tier_of(id).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_migrating_vanished_record_drops_its_pattern() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("short lived", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            store.enqueue(id, MigrationDirection::Promote).await;
            store.remove_from(StorageTier::Warm, id).await.unwrap();

            let result = store.migrate(id, MigrationDirection::Promote).await;

            assert!(matches!(result, Err(StrataError::NotFound(_))));
            assert!(!store.tracker().contains(&id));
            assert_eq!(store.pending().await, (0, 0));
        }

        #[tokio::test]
        async fn test_warm_overflow_moves_to_cold() {
            let config = TierConfig {
                warm: WarmEvictionConfig {
                    max_entries: 2,
                    ..WarmEvictionConfig::default()
                },
                ..TierConfig::default()
            };
            let store = in_memory_store(config).unwrap();

            for i in 0..3 {
                store
                    .store(format!("note {i}"), Category::Project, BTreeSet::new(), BTreeMap::new())
                    .await
                    .unwrap();
            }

            let stats = store.stats().await.unwrap();
            assert_eq!(stats.tier(StorageTier::Warm).unwrap().records, 2);
            assert_eq!(stats.tier(StorageTier::Cold).unwrap().records, 1);
        }

        #[tokio::test]
        async fn test_refresh_queues_idle_records_for_demotion() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let idle = store
                .store("once useful", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            let untouched = store
                .store("never read", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();

            let now = Utc::now();
            store
                .record_access_at(idle, now - chrono::Duration::days(10))
                .await
                .unwrap();
            store
                .record_access_at(idle, now - chrono::Duration::days(3))
                .await
                .unwrap();

            assert_eq!(store.refresh_scores(100).await, 1);
            assert_eq!(
                store.drain_pending(MigrationDirection::Demote, 10).await,
                vec![idle]
            );
            assert_eq!(store.tier_of(untouched).await.unwrap(), Some(StorageTier::Warm));
        }

        #[tokio::test]
        async fn test_rebuild_patterns_from_tiers() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            for i in 0..3 {
                store
                    .store(format!("note {i}"), Category::Project, BTreeSet::new(), BTreeMap::new())
                    .await
                    .unwrap();
            }
            store.tracker().clear();

            assert_eq!(store.rebuild_patterns().await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_flush_writes_access_counts() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let id = store
                .store("a note", Category::Project, BTreeSet::new(), BTreeMap::new())
                .await
                .unwrap();
            store.record_access(id).await.unwrap();

            assert_eq!(store.flush_access_stats().await.unwrap(), 1);
            let stored = store.warm.read().await.get(id).await.unwrap().unwrap();
            assert_eq!(stored.access_count, 1);
            assert_eq!(store.flush_access_stats().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_identical_stores_get_distinct_ids() {
            let store = in_memory_store(TierConfig::default()).unwrap();
            let tags: BTreeSet<String> = ["rust".to_string()].into();
            let a = store
                .store("same", Category::Project, tags.clone(), BTreeMap::new())
                .await
                .unwrap();
            let b = store
                .store("same", Category::Project, tags, BTreeMap::new())
                .await
                .unwrap();
            assert_ne!(a, b);
        }
    }
}
