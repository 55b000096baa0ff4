//! TOML configuration parsing and validation.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below. [`load_config`] parses and validates a file,
//! [`Config::validate`] checks an in-memory value.
//!
//! ```toml
//! [storage]
//! dir = "./data/index"
//!
//! [chunking]
//! max_chars = 1000
//! overlap_chars = 200
//!
//! [retrieval]
//! top_k = 3
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! temperature = 0.0
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use insight_flow_core::chunk::{SplitParams, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP_CHARS};
use insight_flow_core::generation::{validate_temperature, GenerationOptions};
use insight_flow_core::prompt::PromptTemplate;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Where index generations are persisted. `None` keeps them in memory.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP_CHARS
}

impl ChunkingConfig {
    pub fn split_params(&self) -> Result<SplitParams> {
        SplitParams::new(self.max_chars, self.overlap_chars)
            .with_context(|| "Invalid [chunking] section")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Consecutive rows grouped into one source document.
    #[serde(default = "default_rows_per_document")]
    pub rows_per_document: usize,
    /// Column whose value becomes the `source` metadata instead of the path.
    #[serde(default)]
    pub source_column: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            rows_per_document: default_rows_per_document(),
            source_column: None,
        }
    }
}

fn default_delimiter() -> char {
    ','
}
fn default_rows_per_document() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Skip re-embedding when the file fingerprint matches the live generation.
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            skip_unchanged: default_skip_unchanged(),
        }
    }
}

fn default_skip_unchanged() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateways, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: None,
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> Result<GenerationOptions> {
        GenerationOptions::new(self.temperature, self.max_tokens)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Custom template with `{context}` and `{question}` placeholders.
    #[serde(default)]
    pub template: Option<String>,
}

impl PromptConfig {
    pub fn template(&self) -> Result<PromptTemplate> {
        match &self.template {
            Some(t) => PromptTemplate::new(t.clone()),
            None => Ok(PromptTemplate::default()),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_generation_timeout_secs() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        self.chunking.split_params()?;

        // Validate loader
        if !self.loader.delimiter.is_ascii() {
            bail!("loader.delimiter must be a single ASCII character");
        }
        if self.loader.rows_per_document == 0 {
            bail!("loader.rows_per_document must be >= 1");
        }

        // Validate retrieval
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if let Some(min) = self.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min) {
                bail!("retrieval.min_score must be in [-1.0, 1.0]");
            }
        }

        // Validate embedding
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        // Validate generation
        validate_temperature(self.generation.temperature)
            .with_context(|| "Invalid generation.temperature")?;
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be > 0");
        }
        match self.generation.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if self.generation.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        self.generation.provider
                    );
                }
            }
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        // Validate prompt
        self.prompt.template()?;

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
