//! Retrieval-augmented query engine.
//!
//! [`QueryEngine`] ties the pipeline together: [`ingest`](QueryEngine::ingest)
//! loads a CSV file, chunks it, and builds a new index generation;
//! [`query`](QueryEngine::query) retrieves the best chunks for a question and
//! asks the generator to answer from them.
//!
//! # Query outcomes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | No generation built or persisted | `NoData`, no external call |
//! | No hit survives `min_score` | `NoEvidence`, no generation call |
//! | Hits retrieved | `Answered`, with the hits as sources |
//! | Generator exceeds its timeout | `Err(FlowError::Timeout)` |

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::chunk::{chunk_documents, SplitParams};
use crate::config::{Config, LoaderConfig, RetrievalConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{FlowError, FlowResult};
use crate::generation::{create_generator, validate_temperature, GenerationOptions, Generator};
use crate::index::{GenerationManifest, GenerationSource, VectorIndex};
use crate::loader;
use crate::models::Chunk;
use crate::prompt::{build_context, PromptTemplate};

/// Answer returned when no file has been ingested yet.
pub const NO_DATA_ANSWER: &str = "Please upload a document first.";
/// Answer returned when retrieval finds nothing relevant.
pub const UNKNOWN_ANSWER: &str = "I don't know.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Answered,
    NoData,
    NoEvidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    /// Retrieved chunks the answer was conditioned on, best first.
    pub sources: Vec<Chunk>,
    pub status: QueryStatus,
}

impl QueryResult {
    pub fn no_data() -> Self {
        Self {
            answer: NO_DATA_ANSWER.to_string(),
            sources: Vec::new(),
            status: QueryStatus::NoData,
        }
    }

    pub fn no_evidence() -> Self {
        Self {
            answer: UNKNOWN_ANSWER.to_string(),
            sources: Vec::new(),
            status: QueryStatus::NoEvidence,
        }
    }
}

pub struct QueryEngine {
    index: VectorIndex,
    generator: Arc<dyn Generator>,
    options: GenerationOptions,
    retrieval: RetrievalConfig,
    prompt: PromptTemplate,
    split: SplitParams,
    loader: LoaderConfig,
    skip_unchanged: bool,
    generation_timeout: Duration,
}

impl QueryEngine {
    /// Build an engine with the providers named in `config`, storing
    /// generations under `config.storage.dir` when set.
    pub fn from_config(config: &Config) -> FlowResult<Self> {
        let embedder =
            create_embedder(&config.embedding).map_err(|e| FlowError::Configuration(format!("{:#}", e)))?;
        let generator = create_generator(&config.generation)
            .map_err(|e| FlowError::Configuration(format!("{:#}", e)))?;
        Self::open(config, config.storage.dir.as_deref(), embedder, generator)
    }

    /// Build an engine around explicit providers.
    pub fn open(
        config: &Config,
        storage_dir: Option<&Path>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> FlowResult<Self> {
        config
            .validate()
            .map_err(|e| FlowError::Configuration(format!("{:#}", e)))?;
        let configuration = |e: anyhow::Error| FlowError::Configuration(format!("{:#}", e));

        let index = VectorIndex::open(
            embedder,
            storage_dir,
            config.embedding.batch_size,
            Duration::from_secs(config.embedding.timeout_secs),
        )?;

        Ok(Self {
            index,
            generator,
            options: config.generation.options().map_err(configuration)?,
            retrieval: config.retrieval.clone(),
            prompt: config.prompt.template().map_err(configuration)?,
            split: config.chunking.split_params().map_err(configuration)?,
            loader: config.loader.clone(),
            skip_unchanged: config.ingest.skip_unchanged,
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
        })
    }

    /// Load, chunk, embed, and index `path`, replacing the live generation.
    ///
    /// Returns the number of chunks in the live generation. On failure the
    /// previous generation stays live.
    pub async fn ingest(&mut self, path: &Path) -> FlowResult<usize> {
        let ingestion = |source: anyhow::Error| FlowError::Ingestion {
            path: path.to_path_buf(),
            source,
        };

        let settings = settings_key(&self.split, &self.loader);
        if self.skip_unchanged {
            let fingerprint = loader::fingerprint_file(path).map_err(ingestion)?;
            match self.index.status().await {
                Ok(Some(live)) if live.fingerprint == fingerprint && live.settings == settings => {
                    tracing::info!(
                        path = %path.display(),
                        chunks = live.chunk_count,
                        "File unchanged since last ingest, keeping current index"
                    );
                    return Ok(live.chunk_count);
                }
                Ok(_) => {}
                // An unusable persisted generation is replaced by this build.
                Err(e) => tracing::warn!(error = %e, "Live generation unavailable, rebuilding"),
            }
        }

        let loaded = loader::load_file(path, &self.loader).map_err(ingestion)?;
        let chunks = chunk_documents(&loaded.documents, &self.split);
        tracing::info!(
            path = %path.display(),
            documents = loaded.documents.len(),
            chunks = chunks.len(),
            "Chunked file"
        );

        let generation = self
            .index
            .build(
                &chunks,
                GenerationSource {
                    path: path.display().to_string(),
                    fingerprint: loaded.fingerprint,
                    settings,
                },
            )
            .await?;

        Ok(generation.manifest().chunk_count)
    }

    /// Answer `question` from the live generation.
    pub async fn query(&self, question: &str) -> FlowResult<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FlowError::InvalidInput("question is blank".to_string()));
        }

        let Some(generation) = self.index.current().await? else {
            return Ok(QueryResult::no_data());
        };

        let hits = generation
            .search(question, self.retrieval.top_k, self.retrieval.min_score)
            .await?;
        if hits.is_empty() {
            tracing::info!("No relevant chunks retrieved");
            return Ok(QueryResult::no_evidence());
        }

        let sources: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();
        let prompt = self.prompt.render(&build_context(&sources), question);

        let after = self.generation_timeout;
        let answer = match tokio::time::timeout(after, self.generator.complete(&prompt, &self.options)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => return Err(FlowError::generation(e, after)),
            Err(_) => {
                tracing::warn!(?after, model = self.generator.model_name(), "Generation timed out");
                return Err(FlowError::Timeout {
                    operation: "generation",
                    after,
                });
            }
        };

        Ok(QueryResult {
            answer: answer.trim().to_string(),
            sources,
            status: QueryStatus::Answered,
        })
    }

    /// Change the sampling temperature for subsequent queries. The index is
    /// untouched.
    pub fn set_temperature(&mut self, temperature: f32) -> FlowResult<()> {
        validate_temperature(temperature).map_err(|e| FlowError::InvalidInput(e.to_string()))?;
        self.options.temperature = temperature;
        Ok(())
    }

    pub fn temperature(&self) -> f32 {
        self.options.temperature
    }

    /// Change how many chunks are retrieved per query (`k >= 1`).
    pub fn set_top_k(&mut self, top_k: usize) -> FlowResult<()> {
        if top_k == 0 {
            return Err(FlowError::InvalidInput("top_k must be >= 1".to_string()));
        }
        self.retrieval.top_k = top_k;
        Ok(())
    }

    pub fn top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Manifest of the live generation; `None` until a file is ingested.
    pub async fn status(&self) -> FlowResult<Option<GenerationManifest>> {
        self.index.status().await
    }
}

/// Fingerprint of the loader and chunking settings a generation is built
/// with. The same file under different settings yields different chunks.
fn settings_key(split: &SplitParams, csv: &LoaderConfig) -> String {
    let settings = format!(
        "max_chars={};overlap_chars={};delimiter={:?};rows_per_document={};source_column={:?}",
        split.max_chars(),
        split.overlap_chars(),
        csv.delimiter,
        csv.rows_per_document,
        csv.source_column,
    );
    loader::fingerprint_bytes(settings.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct PanicGenerator;

    #[async_trait]
    impl Generator for PanicGenerator {
        fn model_name(&self) -> &str {
            "panic"
        }
        async fn complete(&self, _: &str, _: &GenerationOptions) -> anyhow::Result<String> {
            panic!("generator must not be called");
        }
    }

    fn engine() -> QueryEngine {
        QueryEngine::open(
            &Config::default(),
            None,
            Arc::new(ConstEmbedder),
            Arc::new(PanicGenerator),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_query_before_ingest_is_no_data() {
        let result = engine().query("what sold best?").await.unwrap();
        assert_eq!(result.status, QueryStatus::NoData);
        assert_eq!(result.answer, NO_DATA_ANSWER);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_is_invalid_input() {
        let err = engine().query("   ").await.err().unwrap();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn test_set_temperature_and_top_k() {
        let mut engine = engine();
        engine.set_temperature(0.8).unwrap();
        assert_eq!(engine.temperature(), 0.8);
        assert!(matches!(
            engine.set_temperature(1.2),
            Err(FlowError::InvalidInput(_))
        ));
        assert_eq!(engine.temperature(), 0.8);

        engine.set_top_k(5).unwrap();
        assert_eq!(engine.top_k(), 5);
        assert!(engine.set_top_k(0).is_err());
    }

    #[test]
    fn test_from_config_with_disabled_providers_is_configuration_error() {
        let err = QueryEngine::from_config(&Config::default()).err().unwrap();
        assert!(matches!(err, FlowError::Configuration(_)));
    }

    #[test]
    fn test_settings_key_tracks_loader_and_chunking() {
        let loader = LoaderConfig::default();
        let split = SplitParams::default();
        let base = settings_key(&split, &loader);
        assert_eq!(base, settings_key(&SplitParams::default(), &LoaderConfig::default()));

        let narrow = SplitParams::new(8, 2).unwrap();
        assert_ne!(base, settings_key(&narrow, &loader));

        let grouped = LoaderConfig {
            rows_per_document: 2,
            ..LoaderConfig::default()
        };
        assert_ne!(base, settings_key(&split, &grouped));

        let keyed = LoaderConfig {
            source_column: Some("region".to_string()),
            ..LoaderConfig::default()
        };
        assert_ne!(base, settings_key(&split, &keyed));
    }

    #[tokio::test]
    async fn test_missing_file_is_ingestion_error() {
        let mut engine = engine();
        let err = engine
            .ingest(Path::new("/nonexistent/insight-flow.csv"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::Ingestion { .. }));
    }
}
