//! # Insight Flow Core
//!
//! Shared, WASM-safe logic for Insight Flow: data models, chunking,
//! embedder and generator traits, vector store abstraction, top-k search,
//! and prompt assembly.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP clients.
//! Providers and persistence live in the `insight-flow` app crate.

pub mod chunk;
pub mod embedding;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod search;
pub mod store;
