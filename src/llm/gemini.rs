//! Gemini `generateContent` backend.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{send_json, GenerateRequest, LlmProvider, ProviderError, ProviderErrorKind};
use crate::config::GeminiConfig;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self> {
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
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<String, ProviderError> {
        let mut body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens,
            },
        });
        if !req.system_prompt.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": req.system_prompt }],
            });
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let json = send_json(
            self.name(),
            self.client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        parse_response(&json).ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Unknown,
                self.name(),
                "response has no candidates",
            )
        })
    }
}

/// Concatenated text parts of the first candidate. A candidate without
/// text parts (e.g. a safety block) yields an empty string.
fn parse_response(json: &serde_json::Value) -> Option<String> {
    let candidate = json.get("candidates")?.as_array()?.first()?;
    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array());
    Some(
        parts
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default(),
    )
}
