//! Text-generation backends and the failover orchestrator.
//!
//! Every backend implements [`LlmProvider`] and reports failures as a
//! [`ProviderError`] carrying an explicit [`ProviderErrorKind`]. Whether a
//! failure moves on to the next provider in the chain is decided by the
//! [`FAILOVER_POLICY`] table, not by the concrete transport error type.
//!
//! Backends:
//! - [`gemini::GeminiProvider`] (remote, `generateContent`)
//! - [`groq::GroqProvider`] (remote, OpenAI-compatible chat completions)
//! - [`ollama::OllamaProvider`] (local, `/api/generate`)

pub mod gemini;
pub mod groq;
pub mod json;
pub mod ollama;
pub mod orchestrator;

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;

pub use orchestrator::{Generation, LlmOrchestrator};

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: String::new(),
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    pub fn system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    RateLimited,
    BadRequest,
    Timeout,
    ConnectionError,
    Unknown,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::ConnectionError => "connection_error",
            ProviderErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} failed ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Map a non-success HTTP status to an error kind.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        429 => ProviderErrorKind::RateLimited,
        400 => ProviderErrorKind::BadRequest,
        _ => ProviderErrorKind::Unknown,
    }
}

/// Map a transport-level `reqwest` error to an error kind.
pub fn classify_transport(err: &reqwest::Error) -> ProviderErrorKind {
    if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() {
        ProviderErrorKind::ConnectionError
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        ProviderErrorKind::Unknown
    }
}

/// What the orchestrator does after a provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverAction {
    /// Move on to the next provider in the chain.
    Fallback,
    /// Stop and surface the error as-is.
    FailFast,
}

/// `(kind, action when the primary fails, action when a fallback fails)`.
pub const FAILOVER_POLICY: &[(ProviderErrorKind, FailoverAction, FailoverAction)] = &[
    (ProviderErrorKind::RateLimited, FailoverAction::Fallback, FailoverAction::Fallback),
    (ProviderErrorKind::BadRequest, FailoverAction::Fallback, FailoverAction::Fallback),
    (ProviderErrorKind::Timeout, FailoverAction::Fallback, FailoverAction::Fallback),
    (ProviderErrorKind::ConnectionError, FailoverAction::Fallback, FailoverAction::Fallback),
    (ProviderErrorKind::Unknown, FailoverAction::FailFast, FailoverAction::Fallback),
];

/// Look up the [`FAILOVER_POLICY`] action for a failure at `position` in
/// the chain (0 = primary).
pub fn failover_action(kind: ProviderErrorKind, position: usize) -> FailoverAction {
    FAILOVER_POLICY
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, primary, fallback)| if position == 0 { *primary } else { *fallback })
        .unwrap_or(FailoverAction::FailFast)
}

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name reported with every answer (e.g. `"gemini"`).
    fn name(&self) -> &str;

    async fn generate(&self, req: &GenerateRequest) -> Result<String, ProviderError>;
}

/// Send a JSON request and return the JSON body, classifying every failure.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::new(classify_transport(&e), provider, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(ProviderError::new(
            classify_status(status),
            provider,
            format!("HTTP {}: {}", status, body_text),
        ));
    }

    response.json().await.map_err(|e| {
        ProviderError::new(
            classify_transport(&e),
            provider,
            format!("invalid response body: {}", e),
        )
    })
}
