//! Ordered provider chain with policy-driven failover.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::gemini::GeminiProvider;
use super::groq::GroqProvider;
use super::json::clean_json;
use super::ollama::OllamaProvider;
use super::{failover_action, FailoverAction, GenerateRequest, LlmProvider, ProviderError};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::prompts::STRICT_JSON_SUFFIX;

/// A successful generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// Name of the provider that produced `text`.
    pub provider: String,
    pub latency_ms: f64,
}

pub struct LlmOrchestrator {
    chain: Vec<Arc<dyn LlmProvider>>,
    defaults: GenerateRequest,
}

impl LlmOrchestrator {
    pub fn new(primary: Arc<dyn LlmProvider>, fallback: Option<Arc<dyn LlmProvider>>) -> Self {
        let mut chain = vec![primary];
        chain.extend(fallback);
        Self {
            chain,
            defaults: GenerateRequest::new(""),
        }
    }

    /// Build the chain for `config.mode`.
    ///
    /// | Mode | Chain |
    /// |------|-------|
    /// | `cloud` | gemini → groq |
    /// | `groq` | groq → gemini |
    /// | `local` | ollama |
    ///
    /// A remote provider without an API key is left out with a warning.
    pub fn from_config(
        config: &LlmConfig,
        gemini_key: Option<String>,
        groq_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let gemini = match gemini_key {
            Some(key) => Some(Arc::new(GeminiProvider::new(&config.gemini, key)?) as Arc<dyn LlmProvider>),
            None => None,
        };
        let groq = match groq_key {
            Some(key) => Some(Arc::new(GroqProvider::new(&config.groq, key)?) as Arc<dyn LlmProvider>),
            None => None,
        };

        let wanted: Vec<(&str, Option<Arc<dyn LlmProvider>>)> = match config.mode.as_str() {
            "local" => vec![(
                "ollama",
                Some(Arc::new(OllamaProvider::new(&config.ollama)?) as Arc<dyn LlmProvider>),
            )],
            "groq" => vec![("groq", groq), ("gemini", gemini)],
            "cloud" => vec![("gemini", gemini), ("groq", groq)],
            other => return Err(Error::config(format!("Unknown llm.mode: {}", other)).into()),
        };

        let mut chain = Vec::new();
        for (name, provider) in wanted {
            match provider {
                Some(p) => chain.push(p),
                None => warn!(provider = name, "API key not set, provider left out of chain"),
            }
        }
        if chain.is_empty() {
            return Err(Error::config(format!(
                "no LLM provider available for mode '{}' (set GEMINI_API_KEY or GROQ_API_KEY)",
                config.mode
            ))
            .into());
        }
        Ok(Self {
            chain,
            defaults: GenerateRequest::new("")
                .temperature(config.temperature)
                .max_tokens(config.max_tokens),
        })
    }

    /// A request for `prompt` carrying the configured default temperature
    /// and token limit.
    pub fn request(&self, prompt: impl Into<String>) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.into(),
            ..self.defaults.clone()
        }
    }

    /// Provider names in chain order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.chain.iter().map(|p| p.name()).collect()
    }

    /// Generate with the first provider that succeeds.
    ///
    /// Errors:
    /// - [`Error::Provider`] when a provider fails in a way the failover
    ///   policy says must not be masked.
    /// - [`Error::AllProvidersFailed`] when every provider failed.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<Generation> {
        let mut last: Option<ProviderError> = None;

        for (position, provider) in self.chain.iter().enumerate() {
            let start = Instant::now();
            match provider.generate(req).await {
                Ok(text) => {
                    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                    info!(
                        provider = provider.name(),
                        latency_ms = latency_ms.round(),
                        approx_tokens = text.split_whitespace().count(),
                        "LLM call succeeded"
                    );
                    return Ok(Generation {
                        text,
                        provider: provider.name().to_string(),
                        latency_ms,
                    });
                }
                Err(e) => match failover_action(e.kind, position) {
                    FailoverAction::FailFast => {
                        warn!(provider = provider.name(), kind = %e.kind, error = %e.message, "LLM call failed, not falling back");
                        return Err(Error::Provider(e));
                    }
                    FailoverAction::Fallback => {
                        warn!(provider = provider.name(), kind = %e.kind, error = %e.message, "LLM call failed, trying next provider");
                        last = Some(e);
                    }
                },
            }
        }

        Err(Error::AllProvidersFailed(
            last.map(|e| e.to_string())
                .unwrap_or_else(|| "no providers configured".to_string()),
        ))
    }

    /// Generate and parse the response as JSON.
    ///
    /// Markdown fences are stripped before parsing. On a parse failure the
    /// request is sent once more with a stricter instruction appended to
    /// the system prompt; a second failure is [`Error::MalformedResponse`].
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        req: &GenerateRequest,
    ) -> Result<(T, Generation)> {
        let first = self.generate(req).await?;
        match serde_json::from_str(clean_json(&first.text)) {
            Ok(value) => return Ok((value, first)),
            Err(e) => warn!(provider = %first.provider, error = %e, "malformed JSON, retrying with strict suffix"),
        }

        let mut strict = req.clone();
        strict.system_prompt.push_str(STRICT_JSON_SUFFIX);
        let second = self.generate(&strict).await?;
        match serde_json::from_str(clean_json(&second.text)) {
            Ok(value) => Ok((value, second)),
            Err(e) => Err(Error::malformed(format!(
                "{} returned invalid JSON twice: {}",
                second.provider, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed list of outcomes, one per call.
    struct Scripted {
        name: &'static str,
        outcomes: Mutex<VecDeque<std::result::Result<String, ProviderErrorKind>>>,
        calls: AtomicUsize,
        last_system: Mutex<String>,
    }

    impl Scripted {
        fn new(
            name: &'static str,
            outcomes: Vec<std::result::Result<&str, ProviderErrorKind>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcomes: Mutex::new(
                    outcomes
                        .into_iter()
                        .map(|o| o.map(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                last_system: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, req: &GenerateRequest) -> std::result::Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_system.lock().unwrap() = req.system_prompt.clone();
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(kind)) => Err(ProviderError::new(kind, self.name, "scripted failure")),
                None => Err(ProviderError::new(ProviderErrorKind::Unknown, self.name, "script exhausted")),
            }
        }
    }

    fn req() -> GenerateRequest {
        GenerateRequest::new("prompt")
    }

    #[tokio::test]
    async fn test_primary_success() {
        let a = Scripted::new("a", vec![Ok("hello")]);
        let orch = LlmOrchestrator::new(a, None);
        let gen = orch.generate(&req()).await.unwrap();
        assert_eq!(gen.provider, "a");
        assert_eq!(gen.text, "hello");
        assert!(gen.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_rate_limited_primary_falls_back() {
        let a = Scripted::new("a", vec![Err(ProviderErrorKind::RateLimited)]);
        let b = Scripted::new("b", vec![Ok("from b")]);
        let orch = LlmOrchestrator::new(a, Some(b as Arc<dyn LlmProvider>));
        let gen = orch.generate(&req()).await.unwrap();
        assert_eq!(gen.provider, "b");
    }

    #[tokio::test]
    async fn test_unknown_primary_error_is_not_masked() {
        let a = Scripted::new("a", vec![Err(ProviderErrorKind::Unknown)]);
        let b = Scripted::new("b", vec![Ok("from b")]);
        let orch = LlmOrchestrator::new(a, Some(b.clone() as Arc<dyn LlmProvider>));
        let err = orch.generate(&req()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ref e) if e.kind == ProviderErrorKind::Unknown));
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_providers_failed() {
        let a = Scripted::new("a", vec![Err(ProviderErrorKind::Timeout)]);
        let b = Scripted::new("b", vec![Err(ProviderErrorKind::ConnectionError)]);
        let orch = LlmOrchestrator::new(a, Some(b as Arc<dyn LlmProvider>));
        let err = orch.generate(&req()).await.unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_from_fallback_exhausts_chain() {
        let a = Scripted::new("a", vec![Err(ProviderErrorKind::BadRequest)]);
        let b = Scripted::new("b", vec![Err(ProviderErrorKind::Unknown)]);
        let orch = LlmOrchestrator::new(a, Some(b as Arc<dyn LlmProvider>));
        let err = orch.generate(&req()).await.unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed(_)));
    }

    #[derive(Debug, serde::Deserialize)]
    struct Verdict {
        ok: bool,
    }

    #[tokio::test]
    async fn test_generate_json_strips_fences() {
        let a = Scripted::new("a", vec![Ok("```json\n{\"ok\": true}\n```")]);
        let orch = LlmOrchestrator::new(a, None);
        let (v, _): (Verdict, _) = orch.generate_json(&req()).await.unwrap();
        assert!(v.ok);
    }

    #[tokio::test]
    async fn test_generate_json_retries_once_with_strict_suffix() {
        let a = Scripted::new("a", vec![Ok("Sure! Here it is"), Ok("{\"ok\": false}")]);
        let orch = LlmOrchestrator::new(a.clone(), None);
        let (v, _): (Verdict, _) = orch.generate_json(&req()).await.unwrap();
        assert!(!v.ok);
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
        assert!(a.last_system.lock().unwrap().ends_with(STRICT_JSON_SUFFIX));
    }

    #[tokio::test]
    async fn test_generate_json_gives_up_after_second_failure() {
        let a = Scripted::new("a", vec![Ok("nope"), Ok("still nope")]);
        let orch = LlmOrchestrator::new(a, None);
        let err = orch.generate_json::<Verdict>(&req()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_chain_order_by_mode() {
        let mut config = LlmConfig::default();
        let orch = LlmOrchestrator::from_config(&config, Some("g".into()), Some("q".into())).unwrap();
        assert_eq!(orch.provider_names(), vec!["gemini", "groq"]);

        config.mode = "groq".to_string();
        let orch = LlmOrchestrator::from_config(&config, Some("g".into()), Some("q".into())).unwrap();
        assert_eq!(orch.provider_names(), vec!["groq", "gemini"]);

        config.mode = "local".to_string();
        let orch = LlmOrchestrator::from_config(&config, None, None).unwrap();
        assert_eq!(orch.provider_names(), vec!["ollama"]);
    }

    #[test]
    fn test_missing_keys_are_skipped() {
        let config = LlmConfig::default();
        let orch = LlmOrchestrator::from_config(&config, None, Some("q".into())).unwrap();
        assert_eq!(orch.provider_names(), vec!["groq"]);
        assert!(LlmOrchestrator::from_config(&config, None, None).is_err());
    }

    #[test]
    fn test_request_carries_configured_defaults() {
        let mut config = LlmConfig::default();
        config.temperature = 0.7;
        config.max_tokens = 512;
        let orch = LlmOrchestrator::from_config(&config, Some("g".into()), None).unwrap();
        let req = orch.request("hi");
        assert_eq!(req.prompt, "hi");
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 512);
        assert!(req.system_prompt.is_empty());
    }
}
