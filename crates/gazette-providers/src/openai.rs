//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the standard
//! `/chat/completions` shape. Every failure here — connection, HTTP
//! status, malformed body — maps to `GazetteError::Generation`: the
//! composer step has no retry fallback, so its error path is uniform.

use async_trait::async_trait;
use gazette_core::config::LlmConfig;
use gazette_core::error::{GazetteError, Result};
use gazette_core::traits::Summarizer;
use serde_json::{Value, json};

/// Chat-completions summarizer.
pub struct OpenAiSummarizer {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiSummarizer {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(GazetteError::ConfigMissing("llm.api_key".into()));
        }
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| GazetteError::Generation(format!("{} connection failed: {e}", url)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GazetteError::Generation(format!(
                "API error {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| GazetteError::Generation(e.to_string()))?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| GazetteError::Generation("No choices in response".into()))?;

        if let Some(usage) = json["usage"].as_object() {
            tracing::debug!(
                "Generation used {} tokens",
                usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0)
            );
        }

        Ok(content.to_string())
    }
}
