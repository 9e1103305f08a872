//! Background tier migration
//!
//! [`TierScheduler`] owns a tokio task that wakes on a fixed interval and
//! drains a bounded batch of queued promotions and demotions from the
//! [`TierStore`]. Failed migrations are logged and dropped; a later access
//! re-queues them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::memory::types::MigrationDirection;
use crate::storage::TierStore;

/// What one scheduler cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub promoted: usize,
    pub demoted: usize,
    pub failed: usize,
    pub evicted: usize,
    pub duplicates_removed: usize,
    /// Migrations queued by re-scoring idle patterns
    pub requeued: usize,
    /// The cycle saw the stop signal and skipped its remaining work
    pub interrupted: bool,
}

/// Cumulative scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub cycles: u64,
    pub promoted: u64,
    pub demoted: u64,
    pub failed: u64,
    pub evicted: u64,
    pub duplicates_removed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    promoted: AtomicU64,
    demoted: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
    duplicates_removed: AtomicU64,
}

impl Counters {
    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.promoted
            .fetch_add(report.promoted as u64, Ordering::Relaxed);
        self.demoted.fetch_add(report.demoted as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.evicted.fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.duplicates_removed
            .fetch_add(report.duplicates_removed as u64, Ordering::Relaxed);
    }
}

/// Periodic migration driver for a [`TierStore`]
pub struct TierScheduler {
    store: Arc<TierStore>,
    config: SchedulerConfig,
    counters: Arc<Counters>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TierScheduler {
    /// Fails on a zero interval or batch, or unusable thresholds
    pub fn new(store: Arc<TierStore>, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            store,
            config,
            counters: Arc::new(Counters::default()),
            stop_tx,
            handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Spawn the background loop; a second call while running is a no-op
    pub fn start(&self) {
        let mut handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Tier scheduler already running");
            return;
        }

        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let config = self.config.clone();

        *handle = Some(tokio::spawn(async move {
            info!(
                interval_secs = config.interval_secs,
                batch_size = config.batch_size,
                "Tier scheduler started"
            );

            let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = run_cycle(&store, &config, &stop_rx).await;
                        counters.record(&report);
                        if report.interrupted {
                            break;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Tier scheduler stopped");
        }));
    }

    /// Signal the loop to stop and wait for it, aborting after the shutdown timeout
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Tier scheduler task ended abnormally: {e}"),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout_ms,
                    "Tier scheduler did not stop in time, aborting"
                );
                handle.abort();
            }
        }
    }

    /// Run one cycle in the foreground
    pub async fn run_cycle(&self) -> CycleReport {
        let stop_rx = self.stop_tx.subscribe();
        let report = run_cycle(&self.store, &self.config, &stop_rx).await;
        self.counters.record(&report);
        report
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            running: self.is_running(),
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            promoted: self.counters.promoted.load(Ordering::Relaxed),
            demoted: self.counters.demoted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            duplicates_removed: self.counters.duplicates_removed.load(Ordering::Relaxed),
        }
    }
}

/// One pass: promotions, demotions, warm capacity, duplicate cleanup, score refresh
async fn run_cycle(
    store: &TierStore,
    config: &SchedulerConfig,
    stop_rx: &watch::Receiver<bool>,
) -> CycleReport {
    let mut report = CycleReport::default();

    for direction in [MigrationDirection::Promote, MigrationDirection::Demote] {
        if *stop_rx.borrow() {
            report.interrupted = true;
            return report;
        }

        for id in store.drain_pending(direction, config.batch_size).await {
            if *stop_rx.borrow() {
                report.interrupted = true;
                return report;
            }

            match store.migrate(id, direction).await {
                Ok(tier) => {
                    debug!(%id, %tier, ?direction, "Scheduled migration complete");
                    match direction {
                        MigrationDirection::Promote => report.promoted += 1,
                        MigrationDirection::Demote => report.demoted += 1,
                    }
                }
                Err(e) => {
                    warn!(%id, ?direction, "Migration failed, dropping for this cycle: {e}");
                    report.failed += 1;
                }
            }
        }
    }

    if *stop_rx.borrow() {
        report.interrupted = true;
        return report;
    }

    match store.enforce_warm_capacity().await {
        Ok(evicted) => report.evicted = evicted.len(),
        Err(e) => warn!("Warm capacity enforcement failed: {e}"),
    }

    match store.reconcile_duplicates().await {
        Ok(removed) => report.duplicates_removed = removed,
        Err(e) => warn!("Duplicate reconciliation failed: {e}"),
    }

    report.requeued = store.refresh_scores(config.refresh_batch).await;

    if report != CycleReport::default() {
        debug!(?report, "Scheduler cycle finished");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use crate::memory::types::{Category, StorageTier};
    use crate::storage::TierConfig;
    use crate::testing::in_memory_store;

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            interval_secs: 1,
            batch_size: 2,
            shutdown_timeout_ms: 1000,
            ..SchedulerConfig::default()
        }
    }

    async fn stored(store: &TierStore, content: &str, category: Category) -> uuid::Uuid {
        store
            .store(content, category, BTreeSet::new(), BTreeMap::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        for config in [
            SchedulerConfig { interval_secs: 0, ..scheduler_config() },
            SchedulerConfig { batch_size: 0, ..scheduler_config() },
            SchedulerConfig { promote_threshold: 10.0, ..scheduler_config() },
        ] {
            let result = TierScheduler::new(Arc::clone(&store), config);
            assert!(matches!(result, Err(crate::error::StrataError::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_cycle_promotes_queued_record() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        let id = stored(&store, "frequently used note", Category::Project).await;
        for _ in 0..15 {
            store.record_access(id).await.unwrap();
        }

        let scheduler = TierScheduler::new(Arc::clone(&store), scheduler_config()).unwrap();
        let report = scheduler.run_cycle().await;

        assert_eq!(report.promoted, 1);
        assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Core));
        assert_eq!(scheduler.stats().promoted, 1);
        assert_eq!(scheduler.stats().cycles, 1);
    }

    #[tokio::test]
    async fn test_cycle_is_bounded_by_batch_size() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        for i in 0..5 {
            let id = stored(&store, &format!("note {i}"), Category::Project).await;
            store.enqueue(id, MigrationDirection::Demote).await;
        }

        let scheduler = TierScheduler::new(Arc::clone(&store), scheduler_config()).unwrap();
        let report = scheduler.run_cycle().await;

        assert_eq!(report.demoted, 2);
        assert_eq!(store.pending().await.1, 3);
    }

    #[tokio::test]
    async fn test_failed_migration_is_dropped() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        let id = stored(&store, "dark mode", Category::Preference).await;
        // Already in core: promotion must fail
        store.enqueue(id, MigrationDirection::Promote).await;

        let scheduler = TierScheduler::new(Arc::clone(&store), scheduler_config()).unwrap();
        let report = scheduler.run_cycle().await;

        assert_eq!(report.failed, 1);
        assert_eq!(store.pending().await, (0, 0));
        assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Core));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        let scheduler = TierScheduler::new(store, scheduler_config()).unwrap();

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.start();

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_background_loop_runs_cycles() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        let id = stored(&store, "frequently used note", Category::Project).await;
        for _ in 0..15 {
            store.record_access(id).await.unwrap();
        }

        let scheduler = TierScheduler::new(Arc::clone(&store), scheduler_config()).unwrap();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.stop().await;

        assert!(scheduler.stats().cycles >= 1);
        assert_eq!(store.tier_of(id).await.unwrap(), Some(StorageTier::Core));
    }

    #[tokio::test]
    async fn test_stopped_signal_interrupts_cycle() {
        let store = Arc::new(in_memory_store(TierConfig::default()).unwrap());
        let id = stored(&store, "note", Category::Project).await;
        store.enqueue(id, MigrationDirection::Demote).await;

        let (stop_tx, stop_rx) = watch::channel(true);
        let report = run_cycle(&store, &scheduler_config(), &stop_rx).await;
        drop(stop_tx);

        assert!(report.interrupted);
        assert_eq!(report.demoted, 0);
        assert_eq!(store.pending().await, (0, 1));
    }
}
