//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`OpenAiEmbeddings`]** — calls an OpenAI-compatible `/embeddings` endpoint.
//! - **[`OllamaEmbeddings`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbeddings`** — runs a fastembed model in-process (feature
//!   `local-embeddings`); no network calls after the model download.
//!
//! Providers are wrapped by [`Embedder`], which the rest of the crate uses.
//! The embedder bounds every provider call with an overall deadline, batches large
//! inputs, unit-normalizes every vector, and pins the vector dimensionality
//! on first use.
//!
//! # Provider Selection
//!
//! The backend is an [`EmbeddingBackend`] enum resolved once by
//! [`create_provider`]; there is no per-call dispatch on strings.
//!
//! Also provides vector utilities:
//! - [`normalize_vector`] — scale a vector to unit L2 norm
//! - [`inner_product`] — similarity between two normalized vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian `f32` encoding used by
//!   the persisted index

#[cfg(feature = "local-embeddings")]
mod local;

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbeddings;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::ProviderError;
use crate::http::{self, Service};

/// Trait for embedding providers.
///
/// Implementations return raw (unnormalized) vectors, one per input text,
/// in input order. They must be deterministic for identical input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

// ============ Embedder ============

/// Normalizing, dimension-checking wrapper around an [`EmbeddingProvider`].
///
/// Cheap to share behind `Arc`; all methods take `&self` and may run
/// concurrently.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    timeout: Duration,
    dims: OnceLock<usize>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, timeout: Duration) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            timeout,
            dims: OnceLock::new(),
        }
    }

    /// Build the configured provider and wrap it.
    ///
    /// `timeout_secs` bounds each HTTP attempt inside the provider, so the
    /// outer deadline has to leave room for every retry and its backoff.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let provider = create_provider(config)?;
        Ok(Self::new(
            provider,
            config.batch_size,
            http::retry_budget(config.timeout_secs, config.max_retries),
        ))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Vector dimensionality, once known.
    pub fn dims(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    /// Fix the dimensionality up front (e.g. to a loaded index's).
    ///
    /// Fails if a different dimensionality was already observed.
    pub fn pin_dims(&self, dims: usize) -> Result<(), ProviderError> {
        let expected = *self.dims.get_or_init(|| dims);
        if expected != dims {
            return Err(ProviderError::DimensionMismatch {
                expected,
                actual: dims,
            });
        }
        Ok(())
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.call(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Embedding("empty embedding response".to_string()))
    }

    /// Embed many texts, in batches of `batch_size`, preserving order.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = i, size = batch.len(), "embedding batch");
            out.extend(self.call(batch).await?);
        }
        Ok(out)
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let vectors = tokio::time::timeout(self.timeout, self.provider.embed(texts))
            .await
            .map_err(|_| ProviderError::Timeout {
                operation: "embedding",
                secs: self.timeout.as_secs(),
            })??;

        if vectors.len() != texts.len() {
            return Err(ProviderError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        vectors
            .into_iter()
            .map(|mut v| {
                self.pin_dims(v.len())?;
                normalize_vector(&mut v);
                Ok(v)
            })
            .collect()
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for the OpenAI API and compatible hosts.
///
/// Calls `POST {url}/embeddings` (default `https://api.openai.com/v1`).
/// Reads the bearer token from the environment variable named by
/// `embedding.api_key_env`.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let model = config.model.clone().ok_or_else(|| {
            ProviderError::Embedding("embedding.model required for OpenAI provider".to_string())
        })?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ProviderError::Embedding(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');

        Ok(Self {
            client: http::client(config.timeout_secs, Service::Embedding)?,
            model,
            endpoint: format!("{}/embeddings", base),
            api_key,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.timeout_secs,
            Service::Embedding,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by their `index` field.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| invalid("OpenAI", "missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires an embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbeddings {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let model = config.model.clone().ok_or_else(|| {
            ProviderError::Embedding("embedding.model required for Ollama provider".to_string())
        })?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');

        Ok(Self {
            client: http::client(config.timeout_secs, Service::Embedding)?,
            model,
            endpoint: format!("{}/api/embed", base),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            self.timeout_secs,
            Service::Embedding,
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("Ollama", "missing embeddings array"))?
        .iter()
        .map(|embedding| parse_vector(embedding, "Ollama"))
        .collect()
}

fn parse_vector(value: &serde_json::Value, provider: &str) -> Result<Vec<f32>, ProviderError> {
    value
        .as_array()
        .ok_or_else(|| invalid(provider, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid(provider, "embedding contains a non-numeric value"))
        })
        .collect()
}

fn invalid(provider: &str, what: &str) -> ProviderError {
    ProviderError::Embedding(format!("invalid {} response: {}", provider, what))
}

/// Create the [`EmbeddingProvider`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | error: [`ProviderError::Disabled`] |
/// | `"openai"` | [`OpenAiEmbeddings`] |
/// | `"ollama"` | [`OllamaEmbeddings`] |
/// | `"local"` | `LocalEmbeddings` (feature `local-embeddings`) |
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    match config.provider {
        EmbeddingBackend::Disabled => Err(ProviderError::Disabled("embedding")),
        EmbeddingBackend::OpenAi => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
        EmbeddingBackend::Ollama => Ok(Arc::new(OllamaEmbeddings::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        EmbeddingBackend::Local => Ok(Arc::new(LocalEmbeddings::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingBackend::Local => Err(ProviderError::Embedding(
            "local embedding provider requires --features local-embeddings".to_string(),
        )),
    }
}

// ============ Vector utilities ============

/// Scale `v` to unit L2 norm in place. The zero vector is left unchanged.
pub fn normalize_vector(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product of two equal-length vectors.
///
/// For unit vectors this equals cosine similarity, in `[-1.0, 1.0]`.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// # Example
///
/// ```rust
/// use passage_retrieval::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a float vector.
///
/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full `f32`
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
