//! SQLite-backed [`VectorStore`] holding one persisted index generation.
//!
//! Each generation file carries its own manifest row (see
//! [`GenerationManifest`]) next to its entries, so a generation can be
//! validated on rehydration without any side tables.
//!
//! Vector search loads every stored embedding and ranks by cosine similarity
//! in Rust; CSV-sized indexes fit comfortably in a single scan.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::index::GenerationManifest;
use crate::migrate;
use crate::models::{Chunk, IndexEntry, Metadata};
use crate::store::{rank_candidates, ChunkCandidate, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a fresh generation file at `path` and apply the schema.
    pub async fn create(path: &Path) -> Result<Self> {
        let pool = db::connect(path, true).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an existing generation file. Fails if it does not exist.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path, false).await?;
        Ok(Self { pool })
    }

    pub async fn write_manifest(&self, manifest: &GenerationManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation (id, model, dims, fingerprint, source_path, settings, chunk_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&manifest.id)
        .bind(&manifest.model)
        .bind(manifest.dims as i64)
        .bind(&manifest.fingerprint)
        .bind(&manifest.source_path)
        .bind(&manifest.settings)
        .bind(manifest.chunk_count as i64)
        .bind(manifest.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn read_manifest(&self) -> Result<GenerationManifest> {
        let row = sqlx::query(
            "SELECT id, model, dims, fingerprint, source_path, settings, chunk_count, created_at FROM generation LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .context("generation manifest missing")?;

        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .context("invalid generation timestamp")?
            .with_timezone(&Utc);
        let dims: i64 = row.get("dims");
        let chunk_count: i64 = row.get("chunk_count");

        Ok(GenerationManifest {
            id: row.get("id"),
            model: row.get("model"),
            dims: dims as usize,
            fingerprint: row.get("fingerprint"),
            source_path: row.get("source_path"),
            settings: row.get("settings"),
            chunk_count: chunk_count as usize,
            created_at,
        })
    }

    /// Close the pool, checkpointing the WAL into the main file.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert_entries(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let chunk = &entry.chunk;
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO entries (id, document_id, chunk_index, sequence, text, hash, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.sequence)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, sequence, text, hash, metadata_json, embedding
            FROM entries
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json)?;
            candidates.push(ChunkCandidate {
                raw_score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    sequence: row.get("sequence"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                    metadata,
                },
            });
        }

        rank_candidates(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
