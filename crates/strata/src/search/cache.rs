//! Ranked-result cache
//!
//! Keyed by the query, the options that affect ranking and the corpus size.
//! When full, the oldest fifth of the entries is evicted in one batch.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::memory::types::Category;
use crate::search::types::{FusionMethod, SearchMode, SearchOptions, SearchResult};

/// One entry in this many is evicted when the cache overflows
const EVICTION_DIVISOR: usize = 5;

/// Everything that can change a ranked list
///
/// Floating point options are keyed by their bit patterns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    mode: SearchMode,
    method: FusionMethod,
    limit: usize,
    lexical_weight: u64,
    vector_weight: u64,
    category_filter: Option<Category>,
    target_category: Option<Category>,
    min_lexical_score: u64,
    min_vector_score: u64,
    category_weights: Vec<(Category, u64)>,
    fast_mode: bool,
    contextual_boost: bool,
    temporal_decay: bool,
    diversity_boost: u64,
    corpus_size: usize,
}

impl CacheKey {
    pub fn new(query: &str, options: &SearchOptions, corpus_size: usize) -> Self {
        Self {
            query: query.to_string(),
            mode: options.mode,
            method: options.method,
            limit: options.limit,
            lexical_weight: options.lexical_weight.to_bits(),
            vector_weight: options.vector_weight.to_bits(),
            category_filter: options.category_filter,
            target_category: options.target_category,
            min_lexical_score: options.min_lexical_score.to_bits(),
            min_vector_score: options.min_vector_score.to_bits(),
            category_weights: options
                .category_weights
                .iter()
                .map(|(category, weight)| (*category, weight.to_bits()))
                .collect(),
            fast_mode: options.fast_mode,
            contextual_boost: options.contextual_boost,
            temporal_decay: options.temporal_decay,
            diversity_boost: options.diversity_boost.to_bits(),
            corpus_size,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<SearchResult>,
    inserted: u64,
}

/// Bounded cache of ranked result lists
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<CacheKey, CacheEntry>,
    capacity: usize,
    sequence: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchResult>> {
        self.entries.get(key).map(|entry| entry.results.clone())
    }

    pub fn insert(&self, key: CacheKey, results: Vec<SearchResult>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let inserted = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(key, CacheEntry { results, inserted });
    }

    fn evict_oldest(&self) {
        let count = self.capacity.div_ceil(EVICTION_DIVISOR).max(1);

        let mut by_age: Vec<(u64, CacheKey)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().inserted, entry.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(inserted, _)| *inserted);

        for (_, key) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        debug!(evicted = count, "Search cache full, evicted oldest entries");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
