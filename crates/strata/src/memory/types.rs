//! Memory types for the Strata system
//!
//! Defines the stored record, the semantic category used as a placement hint,
//! and the storage tiers a record migrates between.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StrataError;

/// A single memory record stored in one of the three tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, generated at store time and never reused
    pub id: Uuid,
    /// The text of the memory
    pub content: String,
    /// Semantic layer, used only as a placement and weighting hint
    pub category: Category,
    /// Free-form tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Opaque caller metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When this record was stored
    pub created_at: DateTime<Utc>,
    /// When this record was last returned to a caller (None until first access)
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// How many times this record has been accessed
    #[serde(default)]
    pub access_count: u32,
    /// Optional project scope
    #[serde(default)]
    pub project_id: Option<String>,
}

impl MemoryRecord {
    /// Create a new record with a fresh id and no access history
    pub fn new(content: impl Into<String>, category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            category,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            last_accessed_at: None,
            access_count: 0,
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

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Size of the content in bytes, the unit tier capacities are measured in
    pub fn content_bytes(&self) -> u64 {
        self.content.len() as u64
    }

    /// Length of the content in characters, the unit placement rules use
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Semantic layer a memory belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// User preferences (style, tooling choices)
    Preference,
    /// System-level facts about the environment
    System,
    /// Project knowledge
    Project,
    /// Saved prompts and instructions
    Prompt,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Preference,
        Category::System,
        Category::Project,
        Category::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Preference => "preference",
            Category::System => "system",
            Category::Project => "project",
            Category::Prompt => "prompt",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preference" => Ok(Category::Preference),
            "system" => Ok(Category::System),
            "project" => Ok(Category::Project),
            "prompt" => Ok(Category::Prompt),
            other => Err(StrataError::Serialization(format!(
                "Unknown category: {other}"
            ))),
        }
    }
}

/// Storage tier, ordered by lookup precedence (core first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Small, fast, byte-budgeted block store
    Core,
    /// Ordered key-value store, count-bounded with eviction to cold
    Warm,
    /// Relational archive, size-bounded
    Cold,
}

impl StorageTier {
    /// All tiers in lookup precedence order
    pub const ALL: [StorageTier; 3] = [StorageTier::Core, StorageTier::Warm, StorageTier::Cold];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Core => "core",
            StorageTier::Warm => "warm",
            StorageTier::Cold => "cold",
        }
    }

    /// One step toward core, or None when already at core
    pub fn promoted(&self) -> Option<StorageTier> {
        match self {
            StorageTier::Core => None,
            StorageTier::Warm => Some(StorageTier::Core),
            StorageTier::Cold => Some(StorageTier::Warm),
        }
    }

    /// One step away from core, or None when already at cold
    pub fn demoted(&self) -> Option<StorageTier> {
        match self {
            StorageTier::Core => Some(StorageTier::Warm),
            StorageTier::Warm => Some(StorageTier::Cold),
            StorageTier::Cold => None,
        }
    }

    /// The neighbouring tier in the given direction
    pub fn step(&self, direction: MigrationDirection) -> Option<StorageTier> {
        match direction {
            MigrationDirection::Promote => self.promoted(),
            MigrationDirection::Demote => self.demoted(),
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageTier {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(StorageTier::Core),
            "warm" => Ok(StorageTier::Warm),
            "cold" => Ok(StorageTier::Cold),
            other => Err(StrataError::Serialization(format!(
                "Unknown storage tier: {other}"
            ))),
        }
    }
}

/// Direction of a single-step tier migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Toward core
    Promote,
    /// Toward cold
    Demote,
}
