//! Access pattern tracking for tier placement
//!
//! Keeps per-record access statistics and turns them into a promotion score in
//! [0, 100]. High scores push a record toward core, low scores toward cold.
//! Patterns are a performance hint: they are never persisted and can be rebuilt
//! from the stored records at any time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::types::{MemoryRecord, MigrationDirection, StorageTier};

pub const MAX_PROMOTION_SCORE: f64 = 100.0;
pub const MIN_PROMOTION_SCORE: f64 = 0.0;

const FREQUENCY_WEIGHT: f64 = 40.0;
const RECENCY_WEIGHT: f64 = 30.0;
const CONSISTENCY_WEIGHT: f64 = 20.0;
/// Accesses needed to saturate the frequency component
const FREQUENCY_SATURATION: f64 = 10.0;
/// Hours after which the recency component reaches zero
const RECENCY_WINDOW_HOURS: f64 = 24.0;

/// Access statistics for a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPattern {
    pub id: Uuid,
    pub access_count: u32,
    /// Baseline for the first inter-access interval
    pub first_seen_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Running average of hours between accesses, `(avg + delta) / 2`
    pub avg_interval_hours: f64,
    pub tier: StorageTier,
    pub promotion_score: f64,
    /// When `promotion_score` was last computed
    pub scored_at: DateTime<Utc>,
}

impl AccessPattern {
    /// A fresh pattern for a newly stored record, scored 0
    pub fn new(id: Uuid, tier: StorageTier, first_seen_at: DateTime<Utc>) -> Self {
        Self {
            id,
            access_count: 0,
            first_seen_at,
            last_accessed_at: None,
            avg_interval_hours: 0.0,
            tier,
            promotion_score: MIN_PROMOTION_SCORE,
            scored_at: first_seen_at,
        }
    }

    /// Rebuild a pattern from what a stored record remembers about itself
    pub fn from_record(record: &MemoryRecord, tier: StorageTier, now: DateTime<Utc>) -> Self {
        let mut pattern = Self::new(record.id, tier, record.created_at);
        pattern.access_count = record.access_count;
        pattern.last_accessed_at = record.last_accessed_at;
        if record.access_count > 0 {
            if let Some(last) = record.last_accessed_at {
                pattern.avg_interval_hours =
                    hours_between(record.created_at, last) / record.access_count as f64;
            }
        }
        pattern.promotion_score = calculate_promotion_score(&pattern, now);
        pattern.scored_at = now;
        pattern
    }
}

/// Tier bonus applied to the promotion score
///
/// Core is penalised so that only sustained use keeps a record there; cold is
/// boosted so that a handful of accesses is enough to bring a record back.
pub fn tier_bonus(tier: StorageTier) -> f64 {
    match tier {
        StorageTier::Core => -10.0,
        StorageTier::Warm => 0.0,
        StorageTier::Cold => 10.0,
    }
}

/// Calculate the promotion score for a pattern at the given instant
///
/// Formula:
/// `40·min(count/10, 1) + 30·max(0, 1 − hoursSinceAccess/24) + 20·consistency + tierBonus`
/// where `consistency = min(1 / ln(avgIntervalHours + 1), 1)` once the record has
/// been accessed. The result is clamped to [0, 100].
pub fn calculate_promotion_score(pattern: &AccessPattern, now: DateTime<Utc>) -> f64 {
    let count = pattern.access_count as f64;
    let frequency = (count / FREQUENCY_SATURATION).min(1.0);

    let recency = match pattern.last_accessed_at {
        Some(last) => (1.0 - hours_between(last, now) / RECENCY_WINDOW_HOURS).max(0.0),
        None => 0.0,
    };

    let consistency = if pattern.access_count > 0 {
        consistency_factor(pattern.avg_interval_hours)
    } else {
        0.0
    };

    let score = FREQUENCY_WEIGHT * frequency
        + RECENCY_WEIGHT * recency
        + CONSISTENCY_WEIGHT * consistency
        + tier_bonus(pattern.tier);

    if score.is_nan() {
        return MIN_PROMOTION_SCORE;
    }
    score.clamp(MIN_PROMOTION_SCORE, MAX_PROMOTION_SCORE)
}

fn consistency_factor(avg_interval_hours: f64) -> f64 {
    let denominator = (avg_interval_hours.max(0.0) + 1.0).ln();
    if denominator <= 0.0 {
        // Back-to-back accesses: perfectly consistent
        return 1.0;
    }
    (1.0 / denominator).min(1.0)
}

fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

/// Score thresholds that turn a pattern into a migration request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThresholds {
    /// Scores strictly above this request promotion (default: 80)
    pub promote: f64,
    /// Scores strictly below this request demotion (default: 20)
    pub demote: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            promote: 80.0,
            demote: 20.0,
        }
    }
}

impl ScoreThresholds {
    /// Both thresholds within the score range and `promote > demote`
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("promote", self.promote), ("demote", self.demote)] {
            if !value.is_finite() || !(MIN_PROMOTION_SCORE..=MAX_PROMOTION_SCORE).contains(&value) {
                return Err(StrataError::Config(format!(
                    "{name} threshold must be within [0, 100], got {value}"
                )));
            }
        }
        if self.promote <= self.demote {
            return Err(StrataError::Config(format!(
                "promote threshold ({}) must exceed demote threshold ({})",
                self.promote, self.demote
            )));
        }
        Ok(())
    }

    /// Decide which migration, if any, a pattern calls for
    pub fn migration_for(&self, pattern: &AccessPattern) -> Option<MigrationDirection> {
        if pattern.promotion_score > self.promote && pattern.tier != StorageTier::Core {
            Some(MigrationDirection::Promote)
        } else if pattern.promotion_score < self.demote && pattern.tier != StorageTier::Cold {
            Some(MigrationDirection::Demote)
        } else {
            None
        }
    }
}

/// Result of recording one access
#[derive(Debug, Clone)]
pub struct AccessOutcome {
    /// The pattern after the update
    pub pattern: AccessPattern,
    /// Migration the new score calls for
    pub migration: Option<MigrationDirection>,
}

/// Aggregate view over all tracked patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessStats {
    pub tracked: usize,
    pub total_accesses: u64,
    pub average_score: f64,
    /// Patterns currently above the promotion threshold outside core
    pub promotion_candidates: usize,
    /// Patterns currently below the demotion threshold outside cold
    pub demotion_candidates: usize,
}

/// Concurrent map of access patterns keyed by record id
#[derive(Debug)]
pub struct AccessPatternTracker {
    patterns: DashMap<Uuid, AccessPattern>,
    thresholds: ScoreThresholds,
}

impl Default for AccessPatternTracker {
    fn default() -> Self {
        Self::new(ScoreThresholds::default())
    }
}

impl AccessPatternTracker {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self {
            patterns: DashMap::new(),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        self.thresholds
    }

    /// Start tracking a newly stored record at score 0
    pub fn track(&self, id: Uuid, tier: StorageTier, first_seen_at: DateTime<Utc>) {
        self.patterns
            .insert(id, AccessPattern::new(id, tier, first_seen_at));
    }

    /// Insert a pattern rebuilt from a stored record
    pub fn restore(&self, pattern: AccessPattern) {
        self.patterns.insert(pattern.id, pattern);
    }

    /// Record one access and rescore
    ///
    /// `tier_if_new` is used only when the id has no pattern yet (the pattern was
    /// lost or the record predates the tracker).
    pub fn record_access(
        &self,
        id: Uuid,
        tier_if_new: StorageTier,
        now: DateTime<Utc>,
    ) -> AccessOutcome {
        let mut entry = self
            .patterns
            .entry(id)
            .or_insert_with(|| AccessPattern::new(id, tier_if_new, now));

        let pattern = entry.value_mut();
        let baseline = pattern.last_accessed_at.unwrap_or(pattern.first_seen_at);
        let delta = hours_between(baseline, now);

        pattern.access_count = pattern.access_count.saturating_add(1);
        pattern.avg_interval_hours = (pattern.avg_interval_hours + delta) / 2.0;
        pattern.last_accessed_at = Some(now);
        pattern.promotion_score = calculate_promotion_score(pattern, now);
        pattern.scored_at = now;

        let pattern = pattern.clone();
        drop(entry);

        let migration = self.thresholds.migration_for(&pattern);
        AccessOutcome { pattern, migration }
    }

    /// Recompute a pattern's score against the current clock without counting an access
    pub fn rescore(&self, id: Uuid, now: DateTime<Utc>) -> Option<AccessOutcome> {
        let mut entry = self.patterns.get_mut(&id)?;
        let pattern = entry.value_mut();
        pattern.promotion_score = calculate_promotion_score(pattern, now);
        pattern.scored_at = now;
        let pattern = pattern.clone();
        drop(entry);

        let migration = self.thresholds.migration_for(&pattern);
        Some(AccessOutcome { pattern, migration })
    }

    /// Update the tier a pattern points at after a migration
    pub fn set_tier(&self, id: Uuid, tier: StorageTier) {
        if let Some(mut pattern) = self.patterns.get_mut(&id) {
            pattern.tier = tier;
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<AccessPattern> {
        self.patterns.get(id).map(|p| p.clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.patterns.contains_key(id)
    }

    pub fn remove(&self, id: &Uuid) -> Option<AccessPattern> {
        self.patterns.remove(id).map(|(_, p)| p)
    }

    /// Ids whose scores were computed longest ago
    pub fn stalest(&self, limit: usize) -> Vec<Uuid> {
        let mut entries: Vec<(DateTime<Utc>, Uuid)> = self
            .patterns
            .iter()
            .map(|p| (p.scored_at, p.id))
            .collect();
        entries.sort();
        entries.into_iter().take(limit).map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&self) {
        self.patterns.clear();
    }

    pub fn stats(&self) -> AccessStats {
        let mut stats = AccessStats::default();
        let mut score_sum = 0.0;

        for pattern in self.patterns.iter() {
            stats.tracked += 1;
            stats.total_accesses += pattern.access_count as u64;
            score_sum += pattern.promotion_score;
            match self.thresholds.migration_for(&pattern) {
                Some(MigrationDirection::Promote) => stats.promotion_candidates += 1,
                Some(MigrationDirection::Demote) => stats.demotion_candidates += 1,
                None => {}
            }
        }

        if stats.tracked > 0 {
            stats.average_score = score_sum / stats.tracked as f64;
        }
        stats
    }
}
