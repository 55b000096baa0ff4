//! In-memory [`VectorStore`] implementation.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Vector search
//! is brute-force cosine similarity over all stored vectors. Used when no
//! storage directory is configured, and in tests.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::IndexEntry;

use super::{rank_candidates, ChunkCandidate, VectorStore};

/// In-memory store for one index generation.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert_entries(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut stored = self
            .entries
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        stored.extend_from_slice(entries);
        Ok(())
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        let stored = self
            .entries
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let mut candidates: Vec<ChunkCandidate> = stored
            .iter()
            .map(|entry| ChunkCandidate {
                chunk: entry.chunk.clone(),
                raw_score: cosine_similarity(query_vec, &entry.vector) as f64,
            })
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        let stored = self
            .entries
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(stored.len())
    }
}
