//! Vector index with atomically replaced generations.
//!
//! An [`IndexGeneration`] is one complete, immutable set of embedded chunks
//! together with the embedder that produced it. [`VectorIndex`] holds at most
//! one live generation. [`VectorIndex::build`] embeds and writes a new
//! generation off to the side and swaps it in only once it is complete; a
//! failed or cancelled build leaves the previous generation live.
//!
//! # Persistence
//!
//! With a storage directory, generations are SQLite files managed by
//! [`GenerationDir`]. Nothing is loaded at open time: the first
//! [`current`](VectorIndex::current) call rehydrates the generation named by
//! `CURRENT`, rejecting it if its model or dimensionality disagrees with the
//! configured embedder. Without a storage directory, generations live in an
//! [`InMemoryStore`] and vanish with the process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{FlowError, FlowResult};
use crate::models::{Chunk, IndexEntry, SearchHit};
use crate::search::{search, SearchRequest};
use crate::sqlite_store::SqliteStore;
use crate::storage::GenerationDir;
use crate::store::memory::InMemoryStore;
use crate::store::VectorStore;

/// Describes one index generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationManifest {
    pub id: String,
    /// Embedding model the vectors were produced with.
    pub model: String,
    pub dims: usize,
    /// SHA-256 of the ingested file.
    pub fingerprint: String,
    pub source_path: String,
    /// Fingerprint of the loader and chunking settings used for the build.
    pub settings: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

/// The file a generation is built from.
#[derive(Debug, Clone)]
pub struct GenerationSource {
    pub path: String,
    pub fingerprint: String,
    pub settings: String,
}

/// One complete, searchable set of embedded chunks.
pub struct IndexGeneration {
    manifest: GenerationManifest,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
}

impl IndexGeneration {
    pub fn manifest(&self) -> &GenerationManifest {
        &self.manifest
    }

    /// Embed `query` with this generation's embedder and return the best
    /// `top_k` hits, best first.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: Option<f64>,
    ) -> FlowResult<Vec<SearchHit>> {
        let query_vec = embed_with_timeout(
            self.embedder.embed_query(query),
            self.embed_timeout,
        )
        .await?;
        check_dims(&query_vec, self.manifest.dims)?;

        let request = SearchRequest {
            query_vec: &query_vec,
            top_k,
            min_score,
        };
        let hits = search(self.store.as_ref(), &request)
            .await
            .map_err(FlowError::Storage)?;

        tracing::debug!(
            generation = %self.manifest.id,
            top_k,
            hits = hits.len(),
            best = hits.first().map(|h| h.score),
            "Retrieved chunks"
        );
        Ok(hits)
    }
}

enum Slot {
    /// A persisted generation may exist but has not been looked at yet.
    Unloaded,
    Empty,
    Live(Arc<IndexGeneration>),
}

pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    dir: Option<GenerationDir>,
    slot: RwLock<Slot>,
    batch_size: usize,
    embed_timeout: Duration,
}

impl VectorIndex {
    /// Open an index. With `storage_dir`, orphaned generation files are
    /// removed now and the live generation is rehydrated on first use.
    pub fn open(
        embedder: Arc<dyn Embedder>,
        storage_dir: Option<&Path>,
        batch_size: usize,
        embed_timeout: Duration,
    ) -> FlowResult<Self> {
        if batch_size == 0 {
            return Err(FlowError::Configuration(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        let dir = storage_dir
            .map(GenerationDir::open)
            .transpose()
            .map_err(FlowError::Storage)?;
        let slot = if dir.is_some() {
            Slot::Unloaded
        } else {
            Slot::Empty
        };

        Ok(Self {
            embedder,
            dir,
            slot: RwLock::new(slot),
            batch_size,
            embed_timeout,
        })
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The live generation, rehydrating it from disk on first call.
    pub async fn current(&self) -> FlowResult<Option<Arc<IndexGeneration>>> {
        {
            let slot = self.slot.read().await;
            match &*slot {
                Slot::Live(generation) => return Ok(Some(Arc::clone(generation))),
                Slot::Empty => return Ok(None),
                Slot::Unloaded => {}
            }
        }

        let mut slot = self.slot.write().await;
        // Another caller may have rehydrated while we waited for the lock.
        match &*slot {
            Slot::Live(generation) => return Ok(Some(Arc::clone(generation))),
            Slot::Empty => return Ok(None),
            Slot::Unloaded => {}
        }

        match self.rehydrate().await? {
            Some(generation) => {
                *slot = Slot::Live(Arc::clone(&generation));
                Ok(Some(generation))
            }
            None => {
                *slot = Slot::Empty;
                Ok(None)
            }
        }
    }

    async fn rehydrate(&self) -> FlowResult<Option<Arc<IndexGeneration>>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let Some(id) = dir.current_id().map_err(FlowError::Storage)? else {
            return Ok(None);
        };

        let store = SqliteStore::open(&dir.path_for(&id))
            .await
            .map_err(FlowError::Storage)?;
        let manifest = store.read_manifest().await.map_err(FlowError::Storage)?;

        if manifest.model != self.embedder.model_name() || manifest.dims != self.embedder.dims() {
            return Err(FlowError::Storage(anyhow!(
                "persisted generation {} was built with {} ({} dims), but the configured embedder is {} ({} dims); re-ingest the file",
                manifest.id,
                manifest.model,
                manifest.dims,
                self.embedder.model_name(),
                self.embedder.dims()
            )));
        }

        tracing::info!(
            generation = %manifest.id,
            source = %manifest.source_path,
            chunks = manifest.chunk_count,
            "Rehydrated index generation"
        );

        Ok(Some(Arc::new(IndexGeneration {
            manifest,
            store: Arc::new(store),
            embedder: Arc::clone(&self.embedder),
            embed_timeout: self.embed_timeout,
        })))
    }

    /// Embed `chunks`, write them into a fresh generation, and make it live.
    ///
    /// The previous generation's persisted data is deleted after the swap.
    /// On any failure the previous generation stays live and the partial
    /// generation is removed.
    pub async fn build(
        &self,
        chunks: &[Chunk],
        source: GenerationSource,
    ) -> FlowResult<Arc<IndexGeneration>> {
        if chunks.is_empty() {
            return Err(FlowError::InvalidInput("no chunks to index".to_string()));
        }

        let entries = self.embed_chunks(chunks).await?;
        let manifest = GenerationManifest {
            id: Uuid::new_v4().to_string(),
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            fingerprint: source.fingerprint,
            source_path: source.path,
            settings: source.settings,
            chunk_count: entries.len(),
            created_at: Utc::now(),
        };

        let store: Arc<dyn VectorStore> = match &self.dir {
            Some(dir) => Arc::new(write_generation(dir, &manifest, &entries).await?),
            None => {
                let store = InMemoryStore::new();
                store
                    .insert_entries(&entries)
                    .await
                    .map_err(FlowError::Storage)?;
                Arc::new(store)
            }
        };

        let generation = Arc::new(IndexGeneration {
            manifest,
            store,
            embedder: Arc::clone(&self.embedder),
            embed_timeout: self.embed_timeout,
        });

        self.swap(Arc::clone(&generation)).await?;
        Ok(generation)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> FlowResult<Vec<IndexEntry>> {
        let dims = self.embedder.dims();
        let mut entries = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors =
                embed_with_timeout(self.embedder.embed(&texts), self.embed_timeout).await?;

            if vectors.len() != batch.len() {
                return Err(FlowError::EmbeddingService(anyhow!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                check_dims(&vector, dims)?;
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }

            tracing::debug!(batch = batch_no, size = batch.len(), "Embedded batch");
        }

        Ok(entries)
    }

    async fn swap(&self, generation: Arc<IndexGeneration>) -> FlowResult<()> {
        let mut slot = self.slot.write().await;
        let new_id = generation.manifest.id.clone();

        let previous_id = match &self.dir {
            Some(dir) => {
                let previous = dir.current_id().map_err(FlowError::Storage)?;
                if let Err(e) = dir.set_current(&new_id) {
                    let _ = dir.remove(&new_id);
                    return Err(FlowError::Storage(e));
                }
                previous
            }
            None => None,
        };

        let replaced = std::mem::replace(&mut *slot, Slot::Live(Arc::clone(&generation)));
        drop(slot);

        tracing::info!(
            generation = %new_id,
            source = %generation.manifest.source_path,
            chunks = generation.manifest.chunk_count,
            "Swapped in new index generation"
        );

        if let Slot::Live(old) = &replaced {
            tracing::debug!(generation = %old.manifest.id, "Retired index generation");
        }
        if let (Some(dir), Some(old_id)) = (&self.dir, previous_id) {
            if old_id != new_id {
                if let Err(e) = dir.remove(&old_id) {
                    tracing::warn!(generation = %old_id, error = %e, "Failed to remove previous generation");
                }
            }
        }
        Ok(())
    }

    /// Best `top_k` hits for `query` from the live generation; empty when
    /// there is none.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        min_score: Option<f64>,
    ) -> FlowResult<Vec<SearchHit>> {
        match self.current().await? {
            Some(generation) => generation.search(query, top_k, min_score).await,
            None => Ok(Vec::new()),
        }
    }

    /// Manifest of the live generation, if any.
    pub async fn status(&self) -> FlowResult<Option<GenerationManifest>> {
        Ok(self.current().await?.map(|g| g.manifest.clone()))
    }
}

/// Write a persisted generation, removing the file again on failure.
async fn write_generation(
    dir: &GenerationDir,
    manifest: &GenerationManifest,
    entries: &[IndexEntry],
) -> FlowResult<SqliteStore> {
    let result = async {
        let store = SqliteStore::create(&dir.path_for(&manifest.id)).await?;
        store.insert_entries(entries).await?;
        store.write_manifest(manifest).await?;
        Ok::<_, anyhow::Error>(store)
    }
    .await;

    match result {
        Ok(store) => Ok(store),
        Err(e) => {
            if let Err(cleanup) = dir.remove(&manifest.id) {
                tracing::warn!(generation = %manifest.id, error = %cleanup, "Failed to remove partial generation");
            }
            Err(FlowError::Storage(e))
        }
    }
}

async fn embed_with_timeout<T>(
    call: impl std::future::Future<Output = anyhow::Result<T>>,
    after: Duration,
) -> FlowResult<T> {
    match tokio::time::timeout(after, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FlowError::embedding(e, after)),
        Err(_) => Err(FlowError::Timeout {
            operation: "embedding",
            after,
        }),
    }
}

fn check_dims(vector: &[f32], dims: usize) -> FlowResult<()> {
    if vector.len() != dims {
        return Err(FlowError::EmbeddingService(anyhow!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            dims
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_documents, SplitParams};
    use crate::embedding::Embedder;
    use crate::models::{Metadata, SourceDocument};
    use async_trait::async_trait;

    /// Maps each text to a one-hot vector keyed by its first byte. Texts
    /// containing "broken" get a truncated vector.
    struct FirstLetterEmbedder;

    #[async_trait]
    impl Embedder for FirstLetterEmbedder {
        fn model_name(&self) -> &str {
            "first-letter"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("broken") {
                        return vec![1.0; 3];
                    }
                    let mut v = vec![0.0; 26];
                    let slot = t.bytes().next().map(|b| (b.to_ascii_lowercase().wrapping_sub(b'a')) as usize % 26);
                    if let Some(i) = slot {
                        v[i] = 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        let docs: Vec<SourceDocument> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| SourceDocument {
                id: format!("doc:{}", i),
                text: t.to_string(),
                metadata: Metadata::new(),
            })
            .collect();
        chunk_documents(&docs, &SplitParams::default())
    }

    fn source(name: &str) -> GenerationSource {
        GenerationSource {
            path: name.to_string(),
            fingerprint: format!("fp-{}", name),
            settings: "defaults".to_string(),
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::open(
            Arc::new(FirstLetterEmbedder),
            None,
            2,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_index_searches_empty() {
        let index = index();
        assert!(index.search("anything", 3, None).await.unwrap().is_empty());
        assert!(index.status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_then_search_in_memory() {
        let index = index();
        let generation = index
            .build(&chunks(&["apple", "banana", "cherry", "avocado"]), source("fruit.csv"))
            .await
            .unwrap();
        assert_eq!(generation.manifest().chunk_count, 4);
        assert_eq!(generation.manifest().model, "first-letter");

        let hits = index.search("almond", 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.text, "apple");
        assert_eq!(hits[1].chunk.text, "avocado");
    }

    #[tokio::test]
    async fn test_wrong_dims_fail_build_and_keep_previous() {
        let index = index();
        let first = index
            .build(&chunks(&["apple", "banana"]), source("a.csv"))
            .await
            .unwrap();

        let err = index
            .build(&chunks(&["cherry", "broken row"]), source("b.csv"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::EmbeddingService(_)));
        assert!(err.to_string().contains("3 dimensions"));

        assert_eq!(index.status().await.unwrap().as_ref(), Some(first.manifest()));
        let hits = index.search("apricot", 1, None).await.unwrap();
        assert_eq!(hits[0].chunk.text, "apple");
    }

    #[tokio::test]
    async fn test_build_rejects_no_chunks() {
        let index = index();
        let err = index.build(&[], source("empty.csv")).await.err().unwrap();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rebuild_replaces_generation() {
        let index = index();
        let first = index
            .build(&chunks(&["apple"]), source("a.csv"))
            .await
            .unwrap();
        let second = index
            .build(&chunks(&["banana"]), source("b.csv"))
            .await
            .unwrap();
        assert_ne!(first.manifest().id, second.manifest().id);
        assert_eq!(
            index.status().await.unwrap().unwrap().source_path,
            "b.csv"
        );

        // The retired generation stays searchable for holders of its Arc.
        let hits = first.search("apple", 1, None).await.unwrap();
        assert_eq!(hits[0].chunk.text, "apple");
    }
}
