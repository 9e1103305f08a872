//! Memory records and access tracking
//!
//! Defines the record model shared by every tier and the access pattern
//! tracker that scores records for promotion and demotion.

pub mod access;
pub mod types;

pub use access::{
    AccessOutcome, AccessPattern, AccessPatternTracker, AccessStats, ScoreThresholds,
    calculate_promotion_score,
};
pub use types::{Category, MemoryRecord, MigrationDirection, StorageTier};
