//! Storage abstraction for index entries.
//!
//! The [`VectorStore`] trait defines the storage operations needed by one
//! index generation, enabling pluggable backends (SQLite, in-memory).
//! A store holds exactly one generation's entries; replacing a generation
//! means building a new store, never mutating a live one.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, IndexEntry};

/// A candidate chunk returned from vector search.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk: Chunk,
    /// Cosine similarity between the stored vector and the query vector.
    pub raw_score: f64,
}

/// Abstract storage backend for one index generation.
///
/// All operations are async (via `async-trait`) so native stores can do
/// I/O. In-memory implementations return immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_entries`](VectorStore::insert_entries) | Append embedded chunks |
/// | [`vector_search`](VectorStore::vector_search) | Cosine similarity search |
/// | [`count`](VectorStore::count) | Number of stored entries |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert entries. Implementations write them atomically where the
    /// backend allows it.
    async fn insert_entries(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `limit` candidates, best first.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;
}

/// Sort candidates best-first: score descending, then `sequence` ascending.
///
/// The tie-break makes rankings reproducible when two chunks score the
/// same, which happens for duplicate rows.
pub fn rank_candidates(candidates: &mut [ChunkCandidate]) {
    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.sequence.cmp(&b.chunk.sequence))
    });
}
