//! Interfaces to the external scoring engines and to the record store
//!
//! The lexical and vector engines live outside this crate; the fusion layer
//! only consumes these traits. [`RecordLookup`] is the narrow view of the tier
//! store that search needs for tier tagging and access recording.

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::{Category, MemoryRecord, StorageTier};

/// Parameters for a lexical search
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalQuery {
    pub category_filter: Option<Category>,
    pub limit: usize,
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub record: MemoryRecord,
    pub score: f64,
}

/// Keyword scoring engine
#[async_trait]
pub trait LexicalEngine: Send + Sync {
    async fn search(&self, query: &str, params: &LexicalQuery) -> Result<Vec<LexicalHit>>;
}

/// Parameters for a vector search
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub min_score: f64,
    pub max_results: usize,
    pub category_weights: BTreeMap<Category, f64>,
    pub fast_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub record: MemoryRecord,
    pub score: f64,
    /// Engine-specific label for the kind of match
    pub match_type: String,
}

/// Semantic scoring engine over a caller-supplied corpus
#[async_trait]
pub trait VectorEngine: Send + Sync {
    /// Build or rebuild the index for `corpus`
    async fn build_index(&self, corpus: &[MemoryRecord]) -> Result<()>;

    async fn search(
        &self,
        query: &str,
        corpus: &[MemoryRecord],
        params: &VectorQuery,
    ) -> Result<Vec<VectorHit>>;
}

/// What search needs from the record store
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn tier_of(&self, id: Uuid) -> Result<Option<StorageTier>>;

    /// Note that a record was returned to a caller
    async fn record_access(&self, id: Uuid) -> Result<()>;

    /// Records to scan when the engines are unavailable
    async fn candidates(&self, limit: usize) -> Result<Vec<MemoryRecord>>;
}
