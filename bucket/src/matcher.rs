use crate::cosine::cosine_similarity;
use crate::types::Bucket;

/// The best-scoring bucket for a candidate embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub index: usize,
    pub score: f32,
}

/// Finds the bucket whose representative is most similar to `candidate`.
///
/// Scans in stored order and keeps the first bucket on ties. Returns `None`
/// only for an empty slice.
pub fn best_match(candidate: &[f32], buckets: &[Bucket]) -> Option<Match> {
    let mut best: Option<Match> = None;
    let mut best_score = f32::NEG_INFINITY;
    for (index, b) in buckets.iter().enumerate() {
        let score = cosine_similarity(candidate, &b.representative_embedding);
        if score > best_score {
            best_score = score;
            best = Some(Match { index, score });
        }
    }
    best
}
