//! Embedding clients.
//!
//! Defines the async [`Embedder`] trait and its backends:
//! - **[`DisabledEmbedder`]** always errors; used when `embedding.provider = "disabled"`.
//! - **[`GeminiEmbedder`]** calls `batchEmbedContents` on the Gemini API.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`** runs a fastembed model in-process (feature `local-embeddings`).
//!
//! Each backend owns one `reqwest::Client` built in its constructor; the
//! embedder itself is built once by [`create_embedder`] and shared by the
//! context engine and the indexer.
//!
//! # Retry Strategy
//!
//! The remote backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use project_context_core::embedding::EmbeddingProvider;
use project_context_core::models::EMBEDDING_DIMS;

use crate::config::EmbeddingConfig;
use crate::error::Error;

/// A backend that turns text into vectors.
#[async_trait]
pub trait Embedder: EmbeddingProvider {
    /// Embed `texts`, returning one vector per input in the same order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a batch of texts.
///
/// An empty batch returns an empty result without calling the backend.
/// Vectors whose length differs from [`EMBEDDING_DIMS`] are logged and
/// returned as-is.
pub async fn embed_batch(
    embedder: &dyn Embedder,
    texts: &[String],
) -> std::result::Result<Vec<Vec<f32>>, Error> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder
        .embed_texts(texts)
        .await
        .map_err(|e| Error::embedding(format!("{:#}", e)))?;

    if vectors.len() != texts.len() {
        return Err(Error::embedding(format!(
            "{} returned {} vectors for {} texts",
            embedder.model_name(),
            vectors.len(),
            texts.len()
        )));
    }
    for v in &vectors {
        if v.len() != EMBEDDING_DIMS {
            warn!(
                model = embedder.model_name(),
                expected = EMBEDDING_DIMS,
                actual = v.len(),
                "embedding has unexpected dimensionality"
            );
        }
    }
    Ok(vectors)
}

/// Embed a single text.
pub async fn embed(embedder: &dyn Embedder, text: &str) -> std::result::Result<Vec<f32>, Error> {
    embed_batch(embedder, &[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::embedding("empty embedding response"))
}

// ============ Disabled ============

/// An embedder that always returns errors.
pub struct DisabledEmbedder;

impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Shared HTTP retry loop ============

/// Send the request built by `make_request` until it succeeds, retrying
/// 429 / 5xx / network errors up to `max_retries` times.
async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    make_request: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(backend = label, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match make_request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

fn json_floats(value: &serde_json::Value, what: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?;
    Ok(items
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Gemini ============

/// Gemini `text-embedding-004` client.
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-004".to_string()),
            dims: config.dims,
            // batchEmbedContents accepts at most 100 requests per call
            batch_size: config.batch_size.clamp(1, 100),
            max_retries: config.max_retries,
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_path = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });
        let url = format!(
            "{}/v1beta/{}:batchEmbedContents",
            self.base_url, model_path
        );

        let json = send_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        parse_gemini_response(&json)
    }
}

impl EmbeddingProvider for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(batch).await?);
        }
        Ok(out)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            let values = e
                .get("values")
                .ok_or_else(|| anyhow!("Invalid Gemini response: missing values"))?;
            json_floats(values, "Gemini")
        })
        .collect()
}

// ============ Ollama ============

/// Embedder using a local Ollama instance.
///
/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.url);
        let json = send_with_retry("Ollama", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;
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
        .map(|e| json_floats(e, "Ollama"))
        .collect()
}

// ============ Local (fastembed) ============

/// In-process embedder backed by fastembed.
///
/// The model is downloaded from Hugging Face on first construction and
/// cached; afterwards embedding runs offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-base-en-v1.5".to_string());
        let fastembed_model = match model_name.as_str() {
            "bge-base-en-v1.5" => fastembed::EmbeddingModel::BGEBaseENV15,
            "nomic-embed-text-v1" => fastembed::EmbeddingModel::NomicEmbedTextV1,
            "nomic-embed-text-v1.5" => fastembed::EmbeddingModel::NomicEmbedTextV15,
            "multilingual-e5-base" => fastembed::EmbeddingModel::MultilingualE5Base,
            other => bail!(
                "Unknown local embedding model: '{}'. Supported 768-dim models: \
                 bge-base-en-v1.5, nomic-embed-text-v1, nomic-embed-text-v1.5, multilingual-e5-base",
                other
            ),
        };
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model: Arc::new(std::sync::Mutex::new(model)),
            model_name,
            dims: config.dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Build the configured [`Embedder`].
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] (needs `GEMINI_API_KEY`) |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "gemini" => {
            let key = std::env::var("GEMINI_API_KEY")
                .map_err(|_| Error::config("GEMINI_API_KEY not set"))?;
            Ok(Arc::new(GeminiEmbedder::new(config, key)?))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(Error::config("Local embedding provider requires --features local-embeddings").into()),
        other => Err(Error::config(format!("Unknown embedding provider: {}", other)).into()),
    }
}
