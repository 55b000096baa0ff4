//! # Insight Flow
//!
//! Chat with a CSV file: retrieval-augmented question answering over
//! tabular data.
//!
//! A file is loaded row by row, split into overlapping chunks, embedded,
//! and stored as an immutable index generation. Questions are answered by
//! retrieving the closest chunks and asking a language model to answer
//! from them alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │ CSV file │──▶│ Load+Chunk  │──▶│ Embed+Index  │
//! └──────────┘   └─────────────┘   │  generation  │
//!                                  └──────┬───────┘
//!                                         │ top-k
//!                ┌─────────────┐   ┌──────▼───────┐
//!   question ───▶│   Session   │──▶│ QueryEngine  │──▶ Generator
//!                └─────────────┘   └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use insight_flow::config::load_config;
//! use insight_flow::engine::QueryEngine;
//!
//! let config = load_config(std::path::Path::new("insight-flow.toml"))?;
//! let mut engine = QueryEngine::from_config(&config)?;
//! engine.ingest(std::path::Path::new("sales.csv")).await?;
//! let result = engine.query("Which region sold the most?").await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy ([`FlowError`](error::FlowError)) |
//! | [`logging`] | Tracing subscriber setup |
//! | [`loader`] | CSV loading and file fingerprints |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`index`] | Vector index and generation lifecycle |
//! | [`engine`] | Retrieval-augmented query engine |
//! | [`session`] | Per-user session and chat history |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`storage`] | On-disk generation layout |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod http;
pub mod index;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod session;
pub mod sqlite_store;
pub mod storage;

pub use insight_flow_core::{prompt, search, store};
