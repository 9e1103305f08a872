//! Score fusion
//!
//! Merges lexical and vector hits into one candidate per record id and combines
//! their scores with the configured [`FusionMethod`].

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::memory::types::MemoryRecord;
use crate::search::engine::{LexicalHit, VectorHit};
use crate::search::types::{FusionMethod, MatchMethod};

/// Rank assigned to a record an engine did not return
pub const ABSENT_RANK: usize = 999;

/// Weight of the weaker engine's score under [`FusionMethod::ScoreFusion`]
const SCORE_FUSION_MINOR_WEIGHT: f64 = 0.3;

/// One record with whatever each engine said about it
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: MemoryRecord,
    pub lexical_score: Option<f64>,
    /// 1-based position in the lexical output
    pub lexical_rank: Option<usize>,
    pub vector_score: Option<f64>,
    pub vector_rank: Option<usize>,
    pub match_type: Option<String>,
}

impl Candidate {
    fn from_lexical(hit: LexicalHit, rank: usize) -> Self {
        Self {
            record: hit.record,
            lexical_score: Some(hit.score),
            lexical_rank: Some(rank),
            vector_score: None,
            vector_rank: None,
            match_type: None,
        }
    }

    fn from_vector(hit: VectorHit, rank: usize) -> Self {
        Self {
            record: hit.record,
            lexical_score: None,
            lexical_rank: None,
            vector_score: Some(hit.score),
            vector_rank: Some(rank),
            match_type: Some(hit.match_type),
        }
    }

    /// Which engines contributed
    pub fn match_method(&self) -> MatchMethod {
        match (self.lexical_score, self.vector_score) {
            (Some(_), Some(_)) => MatchMethod::Fusion,
            (None, Some(_)) => MatchMethod::Vector,
            _ => MatchMethod::Lexical,
        }
    }
}

/// Merge engine outputs into one candidate per record id
///
/// Hits with non-finite scores are skipped. Ranks are positions among each
/// engine's accepted hits. When an engine returns the same id twice the higher
/// score wins; the record body is taken from whichever engine scored higher.
pub fn merge(lexical: Vec<LexicalHit>, vector: Vec<VectorHit>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(lexical.len() + vector.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    let lexical = lexical.into_iter().filter(|hit| {
        let finite = hit.score.is_finite();
        if !finite {
            warn!(id = %hit.record.id, score = hit.score, "Skipping lexical hit with non-finite score");
        }
        finite
    });
    for (position, hit) in lexical.enumerate() {
        let rank = position + 1;
        match index.get(&hit.record.id) {
            Some(&i) => {
                let existing = &mut candidates[i];
                if existing.lexical_score.is_none_or(|s| hit.score > s) {
                    existing.lexical_score = Some(hit.score);
                    existing.lexical_rank = Some(rank);
                    existing.record = hit.record;
                }
            }
            None => {
                index.insert(hit.record.id, candidates.len());
                candidates.push(Candidate::from_lexical(hit, rank));
            }
        }
    }

    let vector = vector.into_iter().filter(|hit| {
        let finite = hit.score.is_finite();
        if !finite {
            warn!(id = %hit.record.id, score = hit.score, "Skipping vector hit with non-finite score");
        }
        finite
    });
    for (position, hit) in vector.enumerate() {
        let rank = position + 1;
        match index.get(&hit.record.id) {
            Some(&i) => {
                let existing = &mut candidates[i];
                if existing.vector_score.is_some_and(|s| hit.score <= s) {
                    continue;
                }
                if existing.lexical_score.is_none_or(|s| hit.score > s) {
                    existing.record = hit.record;
                }
                existing.vector_score = Some(hit.score);
                existing.vector_rank = Some(rank);
                existing.match_type = Some(hit.match_type);
            }
            None => {
                index.insert(hit.record.id, candidates.len());
                candidates.push(Candidate::from_vector(hit, rank));
            }
        }
    }

    candidates
}

/// Combine one candidate's engine scores; a missing score counts as 0 and a
/// missing rank as [`ABSENT_RANK`]
pub fn fuse_score(
    method: FusionMethod,
    candidate: &Candidate,
    lexical_weight: f64,
    vector_weight: f64,
) -> f64 {
    let lexical = candidate.lexical_score.unwrap_or(0.0);
    let vector = candidate.vector_score.unwrap_or(0.0);

    match method {
        FusionMethod::Weighted => lexical * lexical_weight + vector * vector_weight,
        FusionMethod::RankFusion => {
            let lexical_rank = candidate.lexical_rank.unwrap_or(ABSENT_RANK) as f64;
            let vector_rank = candidate.vector_rank.unwrap_or(ABSENT_RANK) as f64;
            1000.0 - (lexical_rank * lexical_weight + vector_rank * vector_weight)
        }
        FusionMethod::ReciprocalRank => {
            let reciprocal = |rank: Option<usize>| rank.map_or(0.0, |r| 1.0 / r.max(1) as f64);
            reciprocal(candidate.lexical_rank) * lexical_weight
                + reciprocal(candidate.vector_rank) * vector_weight
        }
        FusionMethod::ScoreFusion => {
            lexical.max(vector) + SCORE_FUSION_MINOR_WEIGHT * lexical.min(vector)
        }
    }
}

/// Confidence in a result, by the path that produced it
pub fn confidence(
    method: MatchMethod,
    lexical_score: Option<f64>,
    vector_score: Option<f64>,
    fusion_score: f64,
) -> f64 {
    let lexical = lexical_score.unwrap_or(0.0);
    let vector = vector_score.unwrap_or(0.0);

    match method {
        MatchMethod::Lexical => (lexical / 10.0).min(1.0),
        MatchMethod::Vector => (vector / 100.0).min(1.0),
        MatchMethod::Fusion => {
            let agreement = if (lexical - vector).abs() < 5.0 { 0.2 } else { 0.0 };
            ((lexical + vector) / 150.0).min(0.8) + agreement
        }
        MatchMethod::Fallback => fusion_score.min(1.0) * 0.5,
    }
}
