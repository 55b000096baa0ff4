//! JSON-over-HTTP with retry, shared by the embedding and generation providers.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including client timeouts) → retry
//! - Backoff: `base`, 2×, 4×, … capped at 32× `base`

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

/// How often and how patiently to retry a request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

/// Build a client whose requests time out after `timeout_secs`.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// POST `body` as JSON and return the parsed JSON response.
///
/// `service` names the remote API in error messages (e.g. `"OpenAI"`).
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    policy: RetryPolicy,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::warn!(service, attempt, ?delay, "Retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .with_context(|| format!("Invalid {} response body", service))?;
                    return Ok(json);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(
                    anyhow::Error::new(e).context(format!("{} request to {} failed", service, url)),
                );
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", service)))
}

/// Read the API key from the named environment variable.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} not set", var),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(6), Duration::from_millis(3200));
        assert_eq!(policy.delay_for(9), Duration::from_millis(3200));
    }

    #[test]
    fn test_missing_api_key() {
        let err = api_key_from_env("INSIGHT_FLOW_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(err.to_string().contains("not set"));
    }
}
