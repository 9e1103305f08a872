//! Warm tier capacity enforcement
//!
//! When the warm tier holds more than `max_entries` records, the surplus is
//! chosen from records that are rarely used (`access_count < 2`) or older than
//! `ttl_hours`, ordered by the configured policy, and moved to cold.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StrataError;
use crate::memory::types::MemoryRecord;

/// Access count below which a warm record is always an eviction candidate
pub const LOW_USE_ACCESS_COUNT: u32 = 2;

/// Order in which eligible warm records are evicted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed first
    #[default]
    Lru,
    /// Fewest accesses first
    Lfu,
    /// Oldest first
    Ttl,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Ttl => "ttl",
        })
    }
}

impl FromStr for EvictionPolicy {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "ttl" => Ok(EvictionPolicy::Ttl),
            other => Err(StrataError::Config(format!(
                "Unknown eviction policy: {other}"
            ))),
        }
    }
}

/// Configuration for warm tier eviction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmEvictionConfig {
    /// Entry count above which eviction runs (default: 1000)
    pub max_entries: usize,
    pub policy: EvictionPolicy,
    /// Age after which any record is eligible (default: 168 = one week)
    pub ttl_hours: u64,
}

impl Default for WarmEvictionConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            policy: EvictionPolicy::Lru,
            ttl_hours: 168,
        }
    }
}

impl WarmEvictionConfig {
    /// Whether a record may be evicted at all
    pub fn is_eligible(&self, record: &MemoryRecord, now: DateTime<Utc>) -> bool {
        let ttl_secs = i64::try_from(self.ttl_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        record.access_count < LOW_USE_ACCESS_COUNT
            || (now - record.created_at).num_seconds() > ttl_secs
    }
}

fn last_used(record: &MemoryRecord) -> DateTime<Utc> {
    record.last_accessed_at.unwrap_or(record.created_at)
}

/// Policy ordering; ties fall back to oldest, then least used, then id
fn compare(policy: EvictionPolicy, a: &MemoryRecord, b: &MemoryRecord) -> Ordering {
    let primary = match policy {
        EvictionPolicy::Lru => last_used(a).cmp(&last_used(b)),
        EvictionPolicy::Lfu => a.access_count.cmp(&b.access_count),
        EvictionPolicy::Ttl => a.created_at.cmp(&b.created_at),
    };

    primary
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.access_count.cmp(&b.access_count))
        .then_with(|| a.id.cmp(&b.id))
}

/// Choose which warm records to move to cold
///
/// `records` must carry live access statistics. Returns at most
/// `records.len() - max_entries` ids, in eviction order. Fewer are returned
/// when not enough records are eligible.
pub fn select_warm_evictions(
    records: &[MemoryRecord],
    config: &WarmEvictionConfig,
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    let excess = records.len().saturating_sub(config.max_entries);
    if excess == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<&MemoryRecord> = records
        .iter()
        .filter(|r| config.is_eligible(r, now))
        .collect();
    candidates.sort_by(|a, b| compare(config.policy, a, b));

    candidates.into_iter().take(excess).map(|r| r.id).collect()
}
