//! Local Ollama backend (`/api/generate`, non-streaming).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{send_json, GenerateRequest, LlmProvider, ProviderError};
use crate::config::OllamaConfig;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Local models are slow on first load; the timeout comes from
    /// `llm.ollama.timeout_secs` (120 s by default).
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<String, ProviderError> {
        // /api/generate has no separate system slot in this mode
        let prompt = if req.system_prompt.is_empty() {
            req.prompt.clone()
        } else {
            format!("{}\n\n{}", req.system_prompt, req.prompt)
        };
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": req.temperature,
                "num_predict": req.max_tokens,
            },
        });

        let json = send_json(
            self.name(),
            self.client
                .post(format!("{}/api/generate", self.base_url))
                .json(&body),
        )
        .await?;

        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string())
    }
}
