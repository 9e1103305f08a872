//! Post-fusion score adjustments
//!
//! Applied in a fixed order after fusion: contextual boost, temporal decay,
//! then diversity re-ranking. Each step multiplies the fusion score.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::memory::types::{Category, MemoryRecord};
use crate::search::types::SearchResult;

const CATEGORY_MATCH_BOOST: f64 = 1.15;
const CONTEXT_SIMILARITY_WEIGHT: f64 = 0.05;
const TEMPORAL_HALF_LIFE_DAYS: f64 = 90.0;
/// Similarity above which a result counts as redundant
const DIVERSITY_SIMILARITY_THRESHOLD: f64 = 0.8;

/// How closely a record fits the caller's context, in [0, 1]
pub fn context_similarity(
    record: &MemoryRecord,
    target: Option<Category>,
    now: DateTime<Utc>,
) -> f64 {
    let mut similarity = 0.0;
    if target == Some(record.category) {
        similarity += 0.3;
    }
    if !record.tags.is_empty() {
        similarity += 0.2;
    }
    if record
        .last_accessed_at
        .is_some_and(|at| now - at <= Duration::hours(24))
    {
        similarity += 0.1;
    }
    f64::min(similarity, 1.0)
}

/// Multiplier for a record in the caller's working category and context
pub fn contextual_factor(record: &MemoryRecord, target: Option<Category>, now: DateTime<Utc>) -> f64 {
    let category = if target == Some(record.category) {
        CATEGORY_MATCH_BOOST
    } else {
        1.0
    };
    category * (1.0 + CONTEXT_SIMILARITY_WEIGHT * context_similarity(record, target, now))
}

/// Multiplier in (0.5, 1] that fades with time since last access
pub fn temporal_factor(record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
    let Some(last_accessed_at) = record.last_accessed_at else {
        return 1.0;
    };
    let days = ((now - last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0);
    0.5 + 0.5 * (-days / TEMPORAL_HALF_LIFE_DAYS).exp()
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lowercase word sets of two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

/// Sort by fusion score descending, ties by id
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.fusion_score
            .total_cmp(&a.fusion_score)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}

/// Penalise results that repeat a higher-ranked result
///
/// Walks the results in descending-score order; a result whose maximum word
/// similarity to any earlier one exceeds the threshold is scaled by
/// `1 − boost·similarity`. Leaves the slice sorted.
pub fn apply_diversity(results: &mut [SearchResult], boost: f64) {
    if boost <= 0.0 || results.len() < 2 {
        return;
    }
    sort_results(results);

    let words: Vec<HashSet<String>> = results.iter().map(|r| word_set(&r.record.content)).collect();
    for i in 1..results.len() {
        let max_similarity = (0..i)
            .map(|j| {
                let union = words[i].union(&words[j]).count();
                if union == 0 {
                    0.0
                } else {
                    words[i].intersection(&words[j]).count() as f64 / union as f64
                }
            })
            .fold(0.0_f64, f64::max);

        if max_similarity > DIVERSITY_SIMILARITY_THRESHOLD {
            results[i].fusion_score *= 1.0 - boost * max_similarity;
        }
    }
    sort_results(results);
}
