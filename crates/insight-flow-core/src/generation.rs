//! Generator trait for text completion services.
//!
//! Concrete generators (OpenAI chat completions, Ollama chat) live in the
//! `insight-flow` app crate.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call generation parameters.
///
/// Kept separate from the generator so a caller can change temperature
/// without rebuilding the generator or touching the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// `0.0` is deterministic/factual, `1.0` is exploratory.
    pub temperature: f32,
    /// Upper bound on completion length; provider default when `None`.
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    /// # Errors
    ///
    /// Fails unless `0.0 <= temperature <= 1.0`.
    pub fn new(temperature: f32, max_tokens: Option<u32>) -> Result<Self> {
        validate_temperature(temperature)?;
        Ok(Self {
            temperature,
            max_tokens,
        })
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Reject temperatures outside `[0.0, 1.0]` (including NaN).
pub fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&temperature) {
        bail!("temperature must be in [0.0, 1.0], got {}", temperature);
    }
    Ok(())
}

/// A text generation service: prompt in, completion out.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Complete `prompt` and return the response text.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_bounds() {
        assert!(GenerationOptions::new(0.0, None).is_ok());
        assert!(GenerationOptions::new(1.0, Some(256)).is_ok());
        assert!(GenerationOptions::new(-0.1, None).is_err());
        assert!(GenerationOptions::new(1.5, None).is_err());
        assert!(GenerationOptions::new(f32::NAN, None).is_err());
    }

    #[test]
    fn test_default_is_deterministic() {
        assert_eq!(GenerationOptions::default().temperature, 0.0);
    }
}
