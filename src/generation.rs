//! Generation providers.
//!
//! Concrete implementations of the core [`Generator`] trait:
//! - **[`OpenAIGenerator`]** calls an OpenAI-compatible `/chat/completions` endpoint.
//! - **[`OllamaGenerator`]** calls an Ollama instance's `/api/chat` endpoint.
//!
//! The prompt is sent as a single user message. Temperature and
//! `max_tokens` come from the per-call [`GenerationOptions`].

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::http::{self, RetryPolicy};

pub use insight_flow_core::generation::*;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Generator backed by the OpenAI chat completions API.
pub struct OpenAIGenerator {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAIGenerator {
    /// Reads the API key from `config.api_key_env`; fails if it is unset.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            client: http::client(config.timeout_secs)?,
            policy: RetryPolicy::new(config.max_retries, config.retry_base_ms),
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        let json = http::post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.policy,
            "OpenAI",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

/// Generator backed by Ollama's chat endpoint (non-streaming).
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for Ollama provider"))?;
        let url = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            client: http::client(config.timeout_secs)?,
            policy: RetryPolicy::new(config.max_retries, config.retry_base_ms),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let mut model_options = serde_json::json!({ "temperature": options.temperature });
        if let Some(max_tokens) = options.max_tokens {
            model_options["num_predict"] = serde_json::json!(max_tokens);
        }
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": model_options,
        });

        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            self.policy,
            "Ollama",
        )
        .await
        .with_context(|| format!("is Ollama running at {}?", self.url))?;

        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the [`Generator`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIGenerator`] |
/// | `"ollama"` | [`OllamaGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => bail!("Generation provider is disabled. Set [generation] provider in config."),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
