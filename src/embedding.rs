//! Embedding providers.
//!
//! Concrete implementations of the core [`Embedder`] trait:
//! - **[`OpenAIEmbedder`]** calls an OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaEmbedder`]** calls an Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`** runs a model in-process via fastembed (cargo feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! Network providers retry transient failures as described in [`crate::http`].
//!
//! # Provider Selection
//!
//! ```rust
//! # use insight_flow::config::EmbeddingConfig;
//! # use insight_flow::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! assert!(create_embedder(&config).is_err());
//! ```

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::http::{self, RetryPolicy};

pub use insight_flow_core::embedding::*;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ OpenAI Provider ============

/// Embedder backed by the OpenAI embeddings API (or a compatible gateway).
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAIEmbedder {
    /// Reads the API key from `config.api_key_env`; fails if it is unset.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key,
            client: http::client(config.timeout_secs)?,
            policy: RetryPolicy::new(config.max_retries, config.retry_base_ms),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.policy,
            "OpenAI",
        )
        .await?;

        let vectors = parse_openai_response(&json)?;
        if vectors.len() != texts.len() {
            bail!(
                "OpenAI returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, json_to_vec(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedder backed by a local or remote Ollama instance.
///
/// Requires an embedding model pulled on the server
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            client: http::client(config.timeout_secs)?,
            policy: RetryPolicy::new(config.max_retries, config.retry_base_ms),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.policy,
            "Ollama",
        )
        .await
        .with_context(|| format!("is Ollama running at {}?", self.url))?;

        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let values = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?;
            json_to_vec(values, "Ollama")
        })
        .collect()
}

fn json_to_vec(values: &[serde_json::Value], service: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow!("Invalid {} response: non-numeric embedding value {}", service, v)
            })
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// In-process embedder. Models are downloaded from Hugging Face on first
/// use and cached; the loaded model is kept for the embedder's lifetime.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Reject unknown names up front rather than on first embed.
        fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            _ => 384,
        });

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, \
             multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let name = self.model_name.clone();
        let batch_size = self.batch_size;
        let slot = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model(&name)?)
                        .with_show_download_progress(false),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model unavailable"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
///
/// `"disabled"` is an error: an index cannot be built without embeddings.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => bail!("Embedding provider is disabled. Set [embedding] provider in config."),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_response_is_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_response_without_data_fails() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 2.0]]});
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.5, 0.25]);
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1]})).is_err());
    }

    #[test]
    fn test_non_numeric_embedding_values_are_rejected() {
        let openai = serde_json::json!({
            "data": [{"index": 0, "embedding": [0.1, "oops", 0.3]}]
        });
        let err = parse_openai_response(&openai).unwrap_err();
        assert!(err.to_string().contains("non-numeric embedding value"));

        let ollama = serde_json::json!({"embeddings": [[0.5, null]]});
        let err = parse_ollama_response(&ollama).unwrap_err();
        assert!(err.to_string().contains("non-numeric embedding value"));
    }

    #[test]
    fn test_create_embedder_rejects_disabled_and_unknown() {
        let mut config = EmbeddingConfig::default();
        assert!(create_embedder(&config).is_err());
        config.provider = "mystery".to_string();
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.dims(), 768);
    }
}
