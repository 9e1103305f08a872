//! Substring scan used when the scoring engines fail

use crate::memory::types::{Category, MemoryRecord};
use crate::search::adjust::sort_results;
use crate::search::fusion::confidence;
use crate::search::types::{MatchMethod, SearchResult};

const PHRASE_SCORE: f64 = 1.0;
const REPEAT_BONUS: f64 = 0.1;
const MAX_REPEAT_BONUS: f64 = 0.5;
const TERM_SCORE: f64 = 0.5;

/// Score a record's content against a query
///
/// The whole phrase scores 1.0 plus 0.1 per extra occurrence (at most +0.5).
/// Otherwise each query term found contributes to `0.5 × matched fraction`,
/// which keeps any phrase hit above any term-only hit.
pub fn substring_score(query: &str, content: &str) -> f64 {
    let phrase = query.trim().to_lowercase();
    if phrase.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();

    let occurrences = content.matches(phrase.as_str()).count();
    if occurrences > 0 {
        let bonus = (REPEAT_BONUS * (occurrences - 1) as f64).min(MAX_REPEAT_BONUS);
        return PHRASE_SCORE + bonus;
    }

    let mut terms: Vec<&str> = phrase.split_whitespace().collect();
    terms.sort_unstable();
    terms.dedup();
    let matched = terms.iter().filter(|t| content.contains(**t)).count();
    TERM_SCORE * matched as f64 / terms.len() as f64
}

/// Rank `candidates` by [`substring_score`], keeping at most `limit` hits
pub fn fallback_scan(
    query: &str,
    candidates: &[MemoryRecord],
    category_filter: Option<Category>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = candidates
        .iter()
        .filter(|r| category_filter.is_none_or(|c| r.category == c))
        .filter_map(|record| {
            let score = substring_score(query, &record.content);
            (score > 0.0).then(|| SearchResult {
                record: record.clone(),
                lexical_score: None,
                vector_score: None,
                fusion_score: score,
                method: MatchMethod::Fallback,
                rank: 0,
                confidence: confidence(MatchMethod::Fallback, None, None, score),
                provenance: format!("fallback substring match ({score:.2})"),
                tier: None,
                match_type: None,
            })
        })
        .collect();

    sort_results(&mut results);
    results.truncate(limit);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}
