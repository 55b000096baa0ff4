//! Top-k semantic retrieval over a [`VectorStore`].
//!
//! The search algorithm operates entirely through the store trait, with no
//! embedding or configuration dependencies. The caller embeds the query
//! with the same embedder the store was built with and passes the vector in.
//!
//! # Algorithm
//!
//! 1. Fetch `top_k` candidates from the store (cosine similarity).
//! 2. Drop candidates scoring below `min_score`, if set.
//! 3. Re-rank: score descending, then chunk `sequence` ascending.
//! 4. Truncate to `top_k`.

use anyhow::Result;

use crate::models::SearchHit;
use crate::store::{rank_candidates, VectorStore};

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    /// Pre-computed query embedding.
    pub query_vec: &'a [f32],
    /// Maximum number of hits to return.
    pub top_k: usize,
    /// Minimum cosine similarity a hit must reach.
    pub min_score: Option<f64>,
}

/// Run a top-k search against a [`VectorStore`] backend.
///
/// Returns at most `top_k` hits, best first. Returns fewer only when the
/// store holds fewer entries (or `min_score` filters some out), and none
/// when the store is empty or `top_k` is zero.
pub async fn search<S: VectorStore + ?Sized>(
    store: &S,
    req: &SearchRequest<'_>,
) -> Result<Vec<SearchHit>> {
    if req.top_k == 0 || req.query_vec.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates = store.vector_search(req.query_vec, req.top_k).await?;

    if let Some(min) = req.min_score {
        candidates.retain(|c| c.raw_score >= min);
    }

    rank_candidates(&mut candidates);
    candidates.truncate(req.top_k);

    Ok(candidates
        .into_iter()
        .map(|c| SearchHit {
            chunk: c.chunk,
            score: c.raw_score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, IndexEntry, Metadata};
    use crate::store::memory::InMemoryStore;
    use futures::executor::block_on;

    fn store_with(n: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        let entries: Vec<IndexEntry> = (0..n)
            .map(|i| IndexEntry {
                chunk: Chunk {
                    id: format!("c{}", i),
                    document_id: format!("d{}", i),
                    chunk_index: 0,
                    sequence: i as i64,
                    text: format!("row {}", i),
                    hash: String::new(),
                    metadata: Metadata::new(),
                },
                vector: vec![1.0, i as f32],
            })
            .collect();
        block_on(store.insert_entries(&entries)).unwrap();
        store
    }

    fn run(store: &InMemoryStore, top_k: usize, min_score: Option<f64>) -> Vec<SearchHit> {
        let req = SearchRequest {
            query_vec: &[1.0, 0.0],
            top_k,
            min_score,
        };
        block_on(search(store, &req)).unwrap()
    }

    #[test]
    fn test_returns_at_most_k() {
        let store = store_with(10);
        let hits = run(&store, 3, None);
        assert_eq!(hits.len(), 3);
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["row 0", "row 1", "row 2"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn test_fewer_than_k_when_store_is_small() {
        let store = store_with(2);
        assert_eq!(run(&store, 5, None).len(), 2);
    }

    #[test]
    fn test_empty_store_and_zero_k() {
        assert!(run(&store_with(0), 3, None).is_empty());
        assert!(run(&store_with(4), 0, None).is_empty());
    }

    #[test]
    fn test_min_score_filters_weak_hits() {
        let store = store_with(5);
        // cos([1,0],[1,i]) = 1/sqrt(1+i^2): 1.0, 0.707, 0.447, ...
        let hits = run(&store, 5, Some(0.7));
        assert_eq!(hits.len(), 2);
        assert!(run(&store, 5, Some(1.01)).is_empty());
    }

    #[test]
    fn test_repeated_search_is_identical() {
        let store = store_with(6);
        let a = run(&store, 4, None);
        let b = run(&store, 4, None);
        let ids_a: Vec<&str> = a.iter().map(|h| h.chunk.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
