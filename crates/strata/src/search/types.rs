//! Search request and result types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StrataError;
use crate::memory::types::{Category, MemoryRecord, StorageTier};

/// Which engines a search consults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    LexicalOnly,
    VectorOnly,
    /// Both engines concurrently, then fuse
    Parallel,
    /// Lexical first; vector only when lexical results are few or weak
    #[default]
    Hybrid,
}

impl SearchMode {
    pub const ALL: [SearchMode; 4] = [
        SearchMode::LexicalOnly,
        SearchMode::VectorOnly,
        SearchMode::Parallel,
        SearchMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::LexicalOnly => "lexical_only",
            SearchMode::VectorOnly => "vector_only",
            SearchMode::Parallel => "parallel",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| StrataError::Config(format!("Unknown search mode: {s}")))
    }
}

/// How lexical and vector scores combine into one fusion score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// `L·wL + V·wV`
    #[default]
    Weighted,
    /// `1000 − (rL·wL + rV·wV)`
    RankFusion,
    /// `(1/rL)·wL + (1/rV)·wV`
    ReciprocalRank,
    /// `max(L,V) + 0.3·min(L,V)`
    ScoreFusion,
}

impl FusionMethod {
    pub const ALL: [FusionMethod; 4] = [
        FusionMethod::Weighted,
        FusionMethod::RankFusion,
        FusionMethod::ReciprocalRank,
        FusionMethod::ScoreFusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::Weighted => "weighted",
            FusionMethod::RankFusion => "rank_fusion",
            FusionMethod::ReciprocalRank => "reciprocal_rank",
            FusionMethod::ScoreFusion => "score_fusion",
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMethod {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FusionMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| StrataError::Config(format!("Unknown fusion method: {s}")))
    }
}

/// Which path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Lexical,
    Vector,
    Fusion,
    Fallback,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMethod::Lexical => "lexical",
            MatchMethod::Vector => "vector",
            MatchMethod::Fusion => "fusion",
            MatchMethod::Fallback => "fallback",
        })
    }
}

/// Per-search options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub method: FusionMethod,
    /// Maximum results returned (default: 10)
    pub limit: usize,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    /// Only return records of this category
    pub category_filter: Option<Category>,
    /// Category the caller is working in; boosts matching records
    pub target_category: Option<Category>,
    pub min_lexical_score: f64,
    pub min_vector_score: f64,
    /// Per-category multipliers handed to the vector engine
    pub category_weights: BTreeMap<Category, f64>,
    /// Ask the vector engine for its cheaper approximate path
    pub fast_mode: bool,
    pub contextual_boost: bool,
    pub temporal_decay: bool,
    /// Similarity penalty strength in [0, 1]; 0 disables diversity re-ranking
    pub diversity_boost: f64,
    pub use_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            method: FusionMethod::Weighted,
            limit: 10,
            lexical_weight: 0.6,
            vector_weight: 0.4,
            category_filter: None,
            target_category: None,
            min_lexical_score: 0.0,
            min_vector_score: 0.0,
            category_weights: BTreeMap::new(),
            fast_mode: false,
            contextual_boost: true,
            temporal_decay: true,
            diversity_boost: 0.3,
            use_cache: true,
        }
    }
}

impl SearchOptions {
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_method(mut self, method: FusionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_weights(mut self, lexical: f64, vector: f64) -> Self {
        self.lexical_weight = lexical;
        self.vector_weight = vector;
        self
    }

    pub fn with_target_category(mut self, category: Category) -> Self {
        self.target_category = Some(category);
        self
    }

    pub fn with_category_filter(mut self, category: Category) -> Self {
        self.category_filter = Some(category);
        self
    }

    /// Turn off contextual, temporal and diversity adjustments
    pub fn without_adjustments(mut self) -> Self {
        self.contextual_boost = false;
        self.temporal_decay = false;
        self.diversity_boost = 0.0;
        self
    }
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: MemoryRecord,
    pub lexical_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub fusion_score: f64,
    pub method: MatchMethod,
    /// 1-based position in the result list
    pub rank: usize,
    pub confidence: f64,
    /// Human-readable account of how the score was produced
    pub provenance: String,
    /// Tier the record was found in, when a record lookup is attached
    pub tier: Option<StorageTier>,
    /// Vector engine's description of the match, when it contributed
    pub match_type: Option<String>,
}
