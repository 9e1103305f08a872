//! Fusion search engine
//!
//! Runs the lexical and vector engines according to the search mode, fuses
//! their scores, applies the post-fusion adjustments and caches ranked lists.
//! Any engine error drops the search to a substring scan; [`FusionSearchEngine::search`]
//! never returns an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::FusionConfig;
use crate::error::{Result, StrataError};
use crate::memory::types::MemoryRecord;
use crate::search::adjust::{apply_diversity, contextual_factor, sort_results, temporal_factor};
use crate::search::cache::{CacheKey, ResultCache};
use crate::search::engine::{
    LexicalEngine, LexicalHit, LexicalQuery, RecordLookup, VectorEngine, VectorHit, VectorQuery,
};
use crate::search::fallback::fallback_scan;
use crate::search::fusion::{Candidate, confidence, fuse_score, merge};
use crate::search::types::{FusionMethod, MatchMethod, SearchMode, SearchOptions, SearchResult};

/// Search counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub searches: u64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub fallbacks: u64,
    pub average_latency_ms: f64,
    pub lexical_calls: u64,
    pub vector_calls: u64,
    pub engine_timeouts: u64,
    pub index_builds: u64,
    pub by_mode: BTreeMap<String, u64>,
    pub by_method: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    searches: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    latency_micros: AtomicU64,
    lexical_calls: AtomicU64,
    vector_calls: AtomicU64,
    engine_timeouts: AtomicU64,
    index_builds: AtomicU64,
    modes: [AtomicU64; 4],
    methods: [AtomicU64; 4],
}

/// Hybrid lexical/vector search over the memory store
pub struct FusionSearchEngine {
    lexical: Arc<dyn LexicalEngine>,
    vector: Arc<dyn VectorEngine>,
    lookup: Option<Arc<dyn RecordLookup>>,
    config: FusionConfig,
    cache: ResultCache,
    /// Corpus size the vector index was last built for
    indexed_size: Mutex<Option<usize>>,
    counters: Counters,
    closed: AtomicBool,
}

impl FusionSearchEngine {
    /// Build an engine over the two scorers; fails on an invalid `config`
    pub fn new(
        lexical: Arc<dyn LexicalEngine>,
        vector: Arc<dyn VectorEngine>,
        config: FusionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lexical,
            vector,
            lookup: None,
            cache: ResultCache::new(config.cache_capacity),
            config,
            indexed_size: Mutex::new(None),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        })
    }

    /// Attach the record store used for tier tagging, access recording and
    /// the fallback candidate scan
    pub fn with_lookup(mut self, lookup: Arc<dyn RecordLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Options seeded from the configured defaults
    pub fn default_options(&self) -> SearchOptions {
        self.config.search_options()
    }

    /// Ranked results for `query`; `corpus` is what the vector engine indexes
    pub async fn search(
        &self,
        query: &str,
        corpus: &[MemoryRecord],
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let started = Instant::now();
        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        self.counters.modes[options.mode as usize].fetch_add(1, Ordering::Relaxed);

        let key = (options.use_cache && !self.closed.load(Ordering::Relaxed))
            .then(|| CacheKey::new(query, options, corpus.len()));

        let cached = key.as_ref().and_then(|key| self.cache.get(key));
        let results = match cached {
            Some(mut results) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(query, results = results.len(), "Search cache hit");
                // Records may have migrated since the list was cached
                self.tag_tiers(&mut results).await;
                results
            }
            None => match self.run(query, corpus, options).await {
                Ok(results) => {
                    if let Some(key) = key {
                        self.cache.insert(key, results.clone());
                    }
                    results
                }
                Err(e) => {
                    warn!(query, mode = %options.mode, "Search failed, using substring fallback: {e}");
                    self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                    self.fallback(query, corpus, options).await
                }
            },
        };

        self.record_accesses(&results).await;
        self.counters
            .latency_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        results
    }

    async fn run(
        &self,
        query: &str,
        corpus: &[MemoryRecord],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        if options.limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let scored: Vec<(Candidate, f64)> = match options.mode {
            SearchMode::LexicalOnly => {
                let hits = self.lexical_hits(query, options).await?;
                merge(hits, Vec::new())
                    .into_iter()
                    .map(|c| {
                        let score = c.lexical_score.unwrap_or(0.0);
                        (c, score)
                    })
                    .collect()
            }
            SearchMode::VectorOnly => {
                let hits = self.vector_hits(query, corpus, options).await?;
                merge(Vec::new(), hits)
                    .into_iter()
                    .map(|c| {
                        let score = c.vector_score.unwrap_or(0.0);
                        (c, score)
                    })
                    .collect()
            }
            SearchMode::Parallel => {
                let (lexical, vector) = tokio::join!(
                    self.lexical_hits(query, options),
                    self.vector_hits(query, corpus, options)
                );
                self.fuse(merge(lexical?, vector?), options)
            }
            SearchMode::Hybrid => {
                let lexical = self.lexical_hits(query, options).await?;
                let top = lexical
                    .iter()
                    .map(|h| h.score)
                    .filter(|s| s.is_finite())
                    .fold(f64::NEG_INFINITY, f64::max);

                let vector = if lexical.len() < options.limit
                    || top < self.config.hybrid_min_lexical_score
                {
                    self.vector_hits(query, corpus, options).await?
                } else {
                    debug!(query, hits = lexical.len(), top, "Lexical results sufficient, skipping vector engine");
                    Vec::new()
                };
                self.fuse(merge(lexical, vector), options)
            }
        };

        let now = Utc::now();
        let mut results: Vec<SearchResult> = scored
            .into_iter()
            .map(|(candidate, score)| {
                let method = candidate.match_method();
                let mut result = SearchResult {
                    provenance: provenance(&candidate, options, score),
                    confidence: confidence(method, candidate.lexical_score, candidate.vector_score, score),
                    record: candidate.record,
                    lexical_score: candidate.lexical_score,
                    vector_score: candidate.vector_score,
                    fusion_score: score,
                    method,
                    rank: 0,
                    tier: None,
                    match_type: candidate.match_type,
                };
                if options.contextual_boost {
                    result.fusion_score *=
                        contextual_factor(&result.record, options.target_category, now);
                }
                if options.temporal_decay {
                    result.fusion_score *= temporal_factor(&result.record, now);
                }
                result
            })
            .collect();

        apply_diversity(&mut results, options.diversity_boost);
        sort_results(&mut results);
        results.truncate(options.limit);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        self.tag_tiers(&mut results).await;
        Ok(results)
    }

    fn fuse(&self, candidates: Vec<Candidate>, options: &SearchOptions) -> Vec<(Candidate, f64)> {
        self.counters.methods[options.method as usize].fetch_add(1, Ordering::Relaxed);
        let (lexical_weight, vector_weight) = self.weights(options);
        candidates
            .into_iter()
            .map(|c| {
                let score = fuse_score(options.method, &c, lexical_weight, vector_weight);
                (c, score)
            })
            .collect()
    }

    /// Per-call weights, or the configured ones when the call's are unusable
    fn weights(&self, options: &SearchOptions) -> (f64, f64) {
        let (lexical, vector) = (options.lexical_weight, options.vector_weight);
        let usable = |w: f64| w.is_finite() && w >= 0.0;
        if usable(lexical) && usable(vector) && lexical + vector > 0.0 {
            (lexical, vector)
        } else {
            warn!(lexical, vector, "Invalid fusion weights, using configured defaults");
            (self.config.lexical_weight, self.config.vector_weight)
        }
    }

    fn candidate_limit(&self, options: &SearchOptions) -> usize {
        options.limit.max(self.config.hybrid_candidate_cap)
    }

    fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.config.engine_timeout_ms)
    }

    async fn lexical_hits(&self, query: &str, options: &SearchOptions) -> Result<Vec<LexicalHit>> {
        let params = LexicalQuery {
            category_filter: options.category_filter,
            limit: self.candidate_limit(options),
            min_score: options.min_lexical_score,
        };
        self.counters.lexical_calls.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.engine_timeout(), self.lexical.search(query, &params)).await {
            Ok(Ok(hits)) => Ok(hits
                .into_iter()
                .filter(|h| options.category_filter.is_none_or(|c| h.record.category == c))
                .collect()),
            Ok(Err(e)) => Err(StrataError::Search(format!("Lexical engine failed: {e}"))),
            Err(_) => {
                self.counters.engine_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout_ms = self.config.engine_timeout_ms,
                    "Lexical engine timed out, continuing without it"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn vector_hits(
        &self,
        query: &str,
        corpus: &[MemoryRecord],
        options: &SearchOptions,
    ) -> Result<Vec<VectorHit>> {
        if corpus.is_empty() {
            debug!("Empty corpus, skipping vector engine");
            return Ok(Vec::new());
        }
        self.ensure_index(corpus).await?;

        let params = VectorQuery {
            min_score: options.min_vector_score,
            max_results: self.candidate_limit(options),
            category_weights: options.category_weights.clone(),
            fast_mode: options.fast_mode,
        };
        self.counters.vector_calls.fetch_add(1, Ordering::Relaxed);

        let search = self.vector.search(query, corpus, &params);
        match tokio::time::timeout(self.engine_timeout(), search).await {
            Ok(Ok(hits)) => Ok(hits
                .into_iter()
                .filter(|h| options.category_filter.is_none_or(|c| h.record.category == c))
                .collect()),
            Ok(Err(e)) => Err(StrataError::Search(format!("Vector engine failed: {e}"))),
            Err(_) => {
                self.counters.engine_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout_ms = self.config.engine_timeout_ms,
                    "Vector engine timed out, continuing without it"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Rebuild the vector index when the corpus size changed since the last build
    async fn ensure_index(&self, corpus: &[MemoryRecord]) -> Result<()> {
        let mut indexed = self.indexed_size.lock().await;
        if *indexed == Some(corpus.len()) {
            return Ok(());
        }

        self.vector
            .build_index(corpus)
            .await
            .map_err(|e| StrataError::Search(format!("Vector index build failed: {e}")))?;
        *indexed = Some(corpus.len());
        self.counters.index_builds.fetch_add(1, Ordering::Relaxed);
        debug!(records = corpus.len(), "Vector index rebuilt");
        Ok(())
    }

    async fn fallback(
        &self,
        query: &str,
        corpus: &[MemoryRecord],
        options: &SearchOptions,
    ) -> Vec<SearchResult> {
        let scan_limit = self.config.fallback_scan_limit;
        let mut results = if !corpus.is_empty() {
            let bounded = &corpus[..corpus.len().min(scan_limit)];
            fallback_scan(query, bounded, options.category_filter, options.limit)
        } else if let Some(lookup) = &self.lookup {
            match lookup.candidates(scan_limit).await {
                Ok(records) => fallback_scan(query, &records, options.category_filter, options.limit),
                Err(e) => {
                    warn!("Fallback could not read candidate records: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        self.tag_tiers(&mut results).await;
        results
    }

    async fn tag_tiers(&self, results: &mut [SearchResult]) {
        let Some(lookup) = &self.lookup else {
            return;
        };
        for result in results.iter_mut() {
            result.tier = match lookup.tier_of(result.record.id).await {
                Ok(tier) => tier,
                Err(e) => {
                    debug!(id = %result.record.id, "Tier lookup failed: {e}");
                    None
                }
            };
        }
    }

    async fn record_accesses(&self, results: &[SearchResult]) {
        let Some(lookup) = &self.lookup else {
            return;
        };
        for result in results {
            if let Err(e) = lookup.record_access(result.record.id).await {
                debug!(id = %result.record.id, "Access not recorded: {e}");
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> SearchStats {
        let searches = self.counters.searches.load(Ordering::Relaxed);
        let cache_hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let latency_micros = self.counters.latency_micros.load(Ordering::Relaxed);

        let (cache_hit_rate, average_latency_ms) = if searches == 0 {
            (0.0, 0.0)
        } else {
            (
                cache_hits as f64 / searches as f64,
                latency_micros as f64 / searches as f64 / 1000.0,
            )
        };

        SearchStats {
            searches,
            cache_hits,
            cache_hit_rate,
            cache_entries: self.cache.len(),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            average_latency_ms,
            lexical_calls: self.counters.lexical_calls.load(Ordering::Relaxed),
            vector_calls: self.counters.vector_calls.load(Ordering::Relaxed),
            engine_timeouts: self.counters.engine_timeouts.load(Ordering::Relaxed),
            index_builds: self.counters.index_builds.load(Ordering::Relaxed),
            by_mode: SearchMode::ALL
                .iter()
                .map(|m| (m.to_string(), self.counters.modes[*m as usize].load(Ordering::Relaxed)))
                .collect(),
            by_method: FusionMethod::ALL
                .iter()
                .map(|m| (m.to_string(), self.counters.methods[*m as usize].load(Ordering::Relaxed)))
                .collect(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Drop cached results and stop caching new ones
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        let stats = self.stats();
        self.cache.clear();
        info!(
            searches = stats.searches,
            cache_hit_rate = stats.cache_hit_rate,
            fallbacks = stats.fallbacks,
            "Fusion search engine closed"
        );
    }
}

fn provenance(candidate: &Candidate, options: &SearchOptions, score: f64) -> String {
    match (options.mode, candidate.match_method()) {
        (SearchMode::LexicalOnly, _) | (SearchMode::VectorOnly, _) => {
            format!("{} score {score:.3}", candidate.match_method())
        }
        (_, MatchMethod::Fusion) => format!(
            "{} fusion of lexical {:.3} (rank {}) and vector {:.3} (rank {}) = {score:.3}",
            options.method,
            candidate.lexical_score.unwrap_or(0.0),
            candidate.lexical_rank.unwrap_or(0),
            candidate.vector_score.unwrap_or(0.0),
            candidate.vector_rank.unwrap_or(0),
        ),
        (_, method) => format!("{} fusion of {method} only = {score:.3}", options.method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::Category;
    use crate::testing::{MockLexicalEngine, MockVectorEngine, lexical_hit, vector_hit};

    fn engine(
        lexical: &Arc<MockLexicalEngine>,
        vector: &Arc<MockVectorEngine>,
    ) -> FusionSearchEngine {
        FusionSearchEngine::new(
            Arc::clone(lexical) as Arc<dyn LexicalEngine>,
            Arc::clone(vector) as Arc<dyn VectorEngine>,
            FusionConfig::default(),
        )
        .unwrap()
    }

    fn plain(mode: SearchMode) -> SearchOptions {
        SearchOptions::default()
            .with_mode(mode)
            .without_adjustments()
    }

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(content, Category::Project)
    }

    mod modes {
        use super::*;

        #[tokio::test]
        async fn test_lexical_only_uses_raw_score() {
            let r = record("tabs over spaces");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 7.5)]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let results = engine.search("tabs", &[], &plain(SearchMode::LexicalOnly)).await;

            assert_eq!(results.len(), 1);
            assert_eq!(results[0].fusion_score, 7.5);
            assert_eq!(results[0].method, MatchMethod::Lexical);
            assert_eq!(results[0].rank, 1);
            assert_eq!(vector.calls(), 0);
        }

        #[tokio::test]
        async fn test_vector_only_uses_raw_score() {
            let r = record("tabs over spaces");
            let lexical = Arc::new(MockLexicalEngine::new());
            let vector = Arc::new(MockVectorEngine::with_hits(vec![vector_hit(&r, 64.0)]));
            let engine = engine(&lexical, &vector);

            let results = engine
                .search("tabs", &[r.clone()], &plain(SearchMode::VectorOnly))
                .await;

            assert_eq!(results[0].fusion_score, 64.0);
            assert_eq!(results[0].method, MatchMethod::Vector);
            assert_eq!(results[0].match_type.as_deref(), Some("semantic"));
            assert_eq!(lexical.calls(), 0);
        }

        #[tokio::test]
        async fn test_parallel_fuses_both_engines() {
            let records: Vec<_> = (1..=4).map(|i| record(&format!("note {i}"))).collect();
            let lexical = Arc::new(MockLexicalEngine::with_hits(
                records[..3].iter().map(|r| lexical_hit(r, 5.0)).collect(),
            ));
            let vector = Arc::new(MockVectorEngine::with_hits(
                records[1..].iter().map(|r| vector_hit(r, 50.0)).collect(),
            ));
            let engine = engine(&lexical, &vector);

            let results = engine
                .search("note", &records, &plain(SearchMode::Parallel))
                .await;

            assert_eq!(results.len(), 4);
            let mut ids: Vec<_> = results.iter().map(|r| r.record.id).collect();
            ids.sort();
            let mut expected: Vec<_> = records.iter().map(|r| r.id).collect();
            expected.sort();
            assert_eq!(ids, expected);
            assert_eq!(results[0].method, MatchMethod::Fusion);
            assert!((results[0].fusion_score - (5.0 * 0.6 + 50.0 * 0.4)).abs() < 1e-9);
        }

        #[tokio::test]
        async fn test_hybrid_weighted_single_engine_score() {
            let r = record("only lexical");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 8.0)]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let results = engine.search("lexical", &[r.clone()], &plain(SearchMode::Hybrid)).await;

            assert_eq!(results.len(), 1);
            assert!((results[0].fusion_score - 4.8).abs() < 1e-9);
            assert_eq!(results[0].vector_score, None);
        }

        #[tokio::test]
        async fn test_hybrid_skips_vector_when_lexical_is_strong() {
            let records: Vec<_> = (0..3).map(|i| record(&format!("strong {i}"))).collect();
            let lexical = Arc::new(MockLexicalEngine::with_hits(
                records.iter().map(|r| lexical_hit(r, 9.0)).collect(),
            ));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let options = plain(SearchMode::Hybrid).with_limit(3);
            let results = engine.search("strong", &records, &options).await;

            assert_eq!(results.len(), 3);
            assert_eq!(vector.calls(), 0);
        }

        #[tokio::test]
        async fn test_hybrid_consults_vector_when_lexical_is_weak() {
            let records: Vec<_> = (0..3).map(|i| record(&format!("weak {i}"))).collect();
            let lexical = Arc::new(MockLexicalEngine::with_hits(
                records.iter().map(|r| lexical_hit(r, 1.0)).collect(),
            ));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let options = plain(SearchMode::Hybrid).with_limit(3);
            engine.search("weak", &records, &options).await;

            assert_eq!(vector.calls(), 1);
        }

        #[tokio::test]
        async fn test_category_filter_applies_to_vector_hits() {
            let project = record("project note");
            let system = MemoryRecord::new("system note", Category::System);
            let lexical = Arc::new(MockLexicalEngine::new());
            let vector = Arc::new(MockVectorEngine::with_hits(vec![
                vector_hit(&project, 50.0),
                vector_hit(&system, 60.0),
            ]));
            let engine = engine(&lexical, &vector);

            let options = plain(SearchMode::VectorOnly).with_category_filter(Category::Project);
            let corpus = vec![project.clone(), system];
            let results = engine.search("note", &corpus, &options).await;

            assert_eq!(results.len(), 1);
            assert_eq!(results[0].record.id, project.id);
        }
    }

    mod resilience {
        use super::*;

        #[tokio::test]
        async fn test_engine_failure_falls_back() {
            let r = record("remember the X factor");
            let lexical = Arc::new(MockLexicalEngine::new());
            lexical.set_failing(true);
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let results = engine.search("X", &[r.clone()], &SearchOptions::default()).await;

            assert_eq!(results.len(), 1);
            assert_eq!(results[0].method, MatchMethod::Fallback);
            assert_eq!(engine.stats().fallbacks, 1);
        }

        #[tokio::test]
        async fn test_fallback_results_not_cached() {
            let r = record("fallback text");
            let lexical = Arc::new(MockLexicalEngine::new());
            lexical.set_failing(true);
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            engine.search("fallback", &[r.clone()], &SearchOptions::default()).await;
            engine.search("fallback", &[r], &SearchOptions::default()).await;

            assert_eq!(lexical.calls(), 2);
            assert_eq!(engine.stats().cache_hits, 0);
        }

        #[tokio::test]
        async fn test_timed_out_engine_contributes_nothing() {
            let r = record("slow vector");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 1.0)]));
            let vector = Arc::new(MockVectorEngine::with_hits(vec![vector_hit(&r, 90.0)]));
            vector.set_delay(Some(Duration::from_millis(500)));

            let config = FusionConfig {
                engine_timeout_ms: 50,
                ..FusionConfig::default()
            };
            let engine = FusionSearchEngine::new(
                Arc::clone(&lexical) as Arc<dyn LexicalEngine>,
                Arc::clone(&vector) as Arc<dyn VectorEngine>,
                config,
            )
            .unwrap();

            let results = engine
                .search("slow", &[r.clone()], &plain(SearchMode::Parallel))
                .await;

            assert_eq!(results.len(), 1);
            assert_eq!(results[0].vector_score, None);
            assert_eq!(results[0].method, MatchMethod::Lexical);
            assert_eq!(engine.stats().engine_timeouts, 1);
            assert_eq!(engine.stats().fallbacks, 0);
        }

        #[tokio::test]
        async fn test_invalid_call_weights_use_configured_weights() {
            let r = record("weights");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 8.0)]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            for (lw, vw) in [(f64::NAN, 0.4), (-1.0, 0.4), (0.0, 0.0), (0.6, f64::INFINITY)] {
                let options = plain(SearchMode::Parallel)
                    .with_method(FusionMethod::Weighted)
                    .with_weights(lw, vw);
                let results = engine.search("weights", &[r.clone()], &options).await;

                assert_eq!(results.len(), 1, "weights ({lw}, {vw})");
                assert!((results[0].fusion_score - 4.8).abs() < 1e-9, "weights ({lw}, {vw})");
            }
        }

        #[test]
        fn test_invalid_config_is_rejected() {
            let configs = [
                FusionConfig { lexical_weight: f64::NAN, ..FusionConfig::default() },
                FusionConfig { lexical_weight: 0.0, vector_weight: 0.0, ..FusionConfig::default() },
                FusionConfig { cache_capacity: 0, ..FusionConfig::default() },
                FusionConfig { diversity_boost: 1.5, ..FusionConfig::default() },
            ];
            for config in configs {
                let result = FusionSearchEngine::new(
                    Arc::new(MockLexicalEngine::new()) as Arc<dyn LexicalEngine>,
                    Arc::new(MockVectorEngine::new()) as Arc<dyn VectorEngine>,
                    config,
                );
                assert!(matches!(result, Err(StrataError::Config(_))));
            }
        }

        #[tokio::test]
        async fn test_empty_query_and_zero_limit() {
            let lexical = Arc::new(MockLexicalEngine::new());
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            assert!(engine.search("   ", &[], &SearchOptions::default()).await.is_empty());
            let zero = SearchOptions::default().with_limit(0);
            assert!(engine.search("q", &[], &zero).await.is_empty());
            assert_eq!(lexical.calls(), 0);
        }
    }

    mod caching {
        use super::*;

        #[tokio::test]
        async fn test_repeat_query_hits_cache() {
            let r = record("cached");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 8.0)]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);
            let options = plain(SearchMode::LexicalOnly);

            let first = engine.search("cached", &[], &options).await;
            let second = engine.search("cached", &[], &options).await;

            assert_eq!(first, second);
            assert_eq!(lexical.calls(), 1);
            let stats = engine.stats();
            assert_eq!(stats.cache_hits, 1);
            assert_eq!(stats.cache_hit_rate, 0.5);
        }

        #[tokio::test]
        async fn test_corpus_size_change_misses_cache_and_rebuilds_index() {
            let a = record("a");
            let b = record("b");
            let lexical = Arc::new(MockLexicalEngine::new());
            let vector = Arc::new(MockVectorEngine::with_hits(vec![vector_hit(&a, 10.0)]));
            let engine = engine(&lexical, &vector);
            let options = plain(SearchMode::VectorOnly);

            engine.search("q", &[a.clone()], &options).await;
            engine.search("q", &[a.clone()], &options).await;
            assert_eq!(vector.builds(), 1);
            assert_eq!(vector.calls(), 1);

            engine.search("q", &[a, b], &options).await;
            assert_eq!(vector.builds(), 2);
            assert_eq!(vector.calls(), 2);
            assert_eq!(vector.indexed_size(), 2);
        }

        #[tokio::test]
        async fn test_close_clears_and_disables_cache() {
            let r = record("closing");
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![lexical_hit(&r, 8.0)]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);
            let options = plain(SearchMode::LexicalOnly);

            engine.search("closing", &[], &options).await;
            engine.close();
            engine.close();
            assert!(engine.is_closed());
            assert_eq!(engine.stats().cache_entries, 0);

            engine.search("closing", &[], &options).await;
            assert_eq!(lexical.calls(), 2);
        }
    }

    mod adjustments {
        use super::*;

        #[tokio::test]
        async fn test_target_category_boosts_matching_record() {
            let project = record("shared words here");
            let system = MemoryRecord::new("other words entirely", Category::System);
            let lexical = Arc::new(MockLexicalEngine::with_hits(vec![
                lexical_hit(&system, 5.0),
                lexical_hit(&project, 5.0),
            ]));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);

            let options = SearchOptions::default()
                .with_mode(SearchMode::LexicalOnly)
                .with_target_category(Category::Project);
            let results = engine.search("words", &[], &options).await;

            assert_eq!(results[0].record.id, project.id);
            assert!((results[0].fusion_score - 5.0 * 1.15 * (1.0 + 0.05 * 0.3)).abs() < 1e-9);
            assert_eq!(results[1].fusion_score, 5.0);
        }

        #[tokio::test]
        async fn test_ordering_is_stable_across_runs() {
            let records: Vec<_> = (0..6).map(|i| record(&format!("entry {i}"))).collect();
            let lexical = Arc::new(MockLexicalEngine::with_hits(
                records.iter().map(|r| lexical_hit(r, 3.0)).collect(),
            ));
            let vector = Arc::new(MockVectorEngine::new());
            let engine = engine(&lexical, &vector);
            let mut options = plain(SearchMode::LexicalOnly);
            options.use_cache = false;

            let first = engine.search("entry", &[], &options).await;
            let second = engine.search("entry", &[], &options).await;

            let ids = |rs: &[SearchResult]| rs.iter().map(|r| r.record.id).collect::<Vec<_>>();
            assert_eq!(ids(&first), ids(&second));
        }
    }
}
