//! Groq backend (OpenAI-compatible chat completions).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{send_json, GenerateRequest, LlmProvider, ProviderError, ProviderErrorKind};
use crate::config::GroqConfig;

pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqProvider {
    pub fn new(config: &GroqConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if !req.system_prompt.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": req.system_prompt }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": req.prompt }));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });

        let json = send_json(
            self.name(),
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::Unknown,
                    self.name(),
                    "response has no choices",
                )
            })?;
        Ok(choice
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string())
    }
}
