//! Similarity retrieval with near-duplicate suppression.
//!
//! # Algorithm
//!
//! 1. Fail with [`RagError::EmptyIndex`] if nothing has been indexed, before
//!    spending an embedding call.
//! 2. Embed the question.
//! 3. Ask the [`VectorIndex`] for `k * oversample_factor` candidates.
//! 4. Fetch canonical chunk text and document paths from the [`Store`].
//! 5. Walk candidates in score order, dropping any whose character-trigram
//!    Jaccard similarity with an already kept passage is at or above
//!    `dedup_threshold`.
//! 6. Truncate to `k`.
//!
//! The candidate order is total (score, then insertion position) and the
//! suppression is greedy, so the result for a smaller `k` is always a prefix
//! of the result for a larger one.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{RetrievalResult, RetrievedChunk};
use crate::store::Store;

/// Finds the passages most relevant to a question.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<dyn Store>,
    oversample_factor: usize,
    dedup_threshold: f64,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        store: Arc<dyn Store>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            oversample_factor: config.oversample_factor.max(1),
            dedup_threshold: config.dedup_threshold,
        }
    }

    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidQuery("k must be at least 1".to_string()));
        }
        if self.index.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let vector = self.embedder.embed(question).await?;
        let hits = self
            .index
            .query(&vector, k.saturating_mul(self.oversample_factor))?;

        let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let chunks = self.store.get_chunks(&ids).await?;

        // get_chunks keeps request order and skips unknown ids, so walk both.
        let mut candidates = Vec::with_capacity(chunks.len());
        let mut chunks = chunks.into_iter().peekable();
        for hit in hits {
            if chunks.peek().is_some_and(|c| c.chunk_id == hit.chunk_id) {
                if let Some(chunk) = chunks.next() {
                    candidates.push(RetrievedChunk {
                        chunk,
                        score: hit.score,
                    });
                }
            } else {
                debug!(chunk_id = %hit.chunk_id, "indexed chunk missing from store");
            }
        }

        let mut items = suppress_near_duplicates(candidates, self.dedup_threshold);
        items.truncate(k);
        Ok(RetrievalResult { items })
    }
}

/// Keep candidates in order, dropping any that is a near-duplicate of one
/// already kept.
pub fn suppress_near_duplicates(
    candidates: Vec<RetrievedChunk>,
    threshold: f64,
) -> Vec<RetrievedChunk> {
    let mut kept: Vec<RetrievedChunk> = Vec::with_capacity(candidates.len());
    let mut kept_grams: Vec<HashSet<String>> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let grams = trigrams(&candidate.chunk.text);
        if kept_grams.iter().any(|g| jaccard(g, &grams) >= threshold) {
            debug!(chunk_id = %candidate.chunk.chunk_id, "suppressed near-duplicate");
            continue;
        }
        kept_grams.push(grams);
        kept.push(candidate);
    }
    kept
}

/// Character-trigram Jaccard similarity of two texts, in `[0, 1]`.
///
/// Texts are lowercased and whitespace runs collapse to one space first.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    jaccard(&trigrams(a), &trigrams(b))
}

fn trigrams(text: &str) -> HashSet<String> {
    let normalized: Vec<char> = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .collect();
    if normalized.len() < 3 {
        return std::iter::once(normalized.into_iter().collect()).collect();
    }
    normalized.windows(3).map(|w| w.iter().collect()).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
