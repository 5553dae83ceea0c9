//! Similarity computation for embeddings.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};
use crate::store::EmbeddingRecord;

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors, or either vector is all zeros
/// - -1.0 means opposite vectors
///
/// Sums are accumulated in `f64`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(score.clamp(-1.0, 1.0) as f32)
}

/// A similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// ID of the matched record.
    pub id: String,

    /// Cosine similarity to the query.
    pub score: f32,
}

impl SearchResult {
    /// Create a new search result.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Score every record against `query` and keep the best `k`.
///
/// Results are ordered by descending score; equal scores are ordered by
/// ascending id. Any record whose length differs from the query fails the
/// whole ranking.
pub fn rank_top_k(query: &[f32], records: &[EmbeddingRecord], k: usize) -> Result<Vec<SearchResult>> {
    let mut scores: Vec<(OrderedFloat<f32>, &str)> = Vec::with_capacity(records.len());

    for record in records {
        let score = cosine_similarity(query, &record.vector)?;
        scores.push((OrderedFloat(score), record.id.as_str()));
    }

    scores.sort_by(|a, b| match b.0.cmp(&a.0) {
        Ordering::Equal => a.1.cmp(b.1),
        other => other,
    });

    Ok(scores
        .into_iter()
        .take(k)
        .map(|(score, id)| SearchResult::new(id, score.0))
        .collect())
}
