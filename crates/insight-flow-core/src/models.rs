//! Core data models used throughout Insight Flow.
//!
//! These types represent the documents, chunks, and index entries that flow
//! through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String metadata attached to documents and inherited by their chunks.
///
/// A `BTreeMap` keeps key order stable, so serialized metadata is
/// byte-identical across runs.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key naming the originating file (or source column value).
pub const META_SOURCE: &str = "source";
/// Metadata key holding the 0-based index of the first row in a document.
pub const META_ROW: &str = "row";

/// One loader-defined unit of an ingested file (a CSV row by default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A contiguous slice of a [`SourceDocument`]'s text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic UUIDv5 of `document_id` and `chunk_index`.
    pub id: String,
    pub document_id: String,
    /// Position within the parent document.
    pub chunk_index: i64,
    /// Position within the whole ingested file.
    pub sequence: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: Metadata,
}

impl Chunk {
    /// The `source` metadata value, if present.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }
}

/// A chunk paired with its embedding vector, as stored in a vector store.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f64,
}
