//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`], which validates the values
//! the rest of the crate relies on (chunk geometry, top-k defaults,
//! provider settings). Every section except `[documents]` is optional.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{default_separators, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Where the index is persisted. `None` keeps it in memory only.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub rebuild_on_corrupt: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            rebuild_on_corrupt: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            separators: default_separators(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

/// Embedding backend, selected once when the provider is created.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Disabled,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
    Ollama,
    /// In-process fastembed model (requires the `local-embeddings` feature).
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingBackend,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (e.g. `http://localhost:11434` for Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Disabled,
            model: None,
            url: None,
            api_key_env: default_openai_key_env(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

/// Generation backend, selected once when the generator is created.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    #[default]
    Disabled,
    /// Any OpenAI-compatible `/chat/completions` endpoint (OpenAI, Together, ...).
    OpenAi,
    Ollama,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationBackend,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationBackend::Disabled,
            model: None,
            url: None,
            api_key_env: default_openai_key_env(),
            max_retries: 5,
            timeout_secs: 120,
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_generate_top_k")]
    pub generate_top_k: usize,
    /// Passages must score strictly above this to be used as generation context.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 3,
            generate_top_k: 5,
            relevance_threshold: 0.5,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_generate_top_k() -> usize {
    5
}
fn default_relevance_threshold() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingBackend::Disabled
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != GenerationBackend::Disabled
    }
}

impl Config {
    /// A config with defaults everywhere except the documents directory.
    pub fn minimal(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents: DocumentsConfig {
                dir: documents_dir.into(),
                include_globs: default_include_globs(),
                recursive: false,
            },
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        if self.documents.include_globs.is_empty() {
            bail!("documents.include_globs must not be empty");
        }

        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }
        if self.chunking.separators.is_empty() {
            bail!("chunking.separators must not be empty");
        }

        if self.retrieval.default_top_k < 1 || self.retrieval.generate_top_k < 1 {
            bail!("retrieval top_k defaults must be >= 1");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.relevance_threshold) {
            bail!("retrieval.relevance_threshold must be in [-1.0, 1.0]");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if matches!(
            self.embedding.provider,
            EmbeddingBackend::OpenAi | EmbeddingBackend::Ollama
        ) && self.embedding.model.is_none()
        {
            bail!(
                "embedding.model must be specified when provider is '{:?}'",
                self.embedding.provider
            );
        }

        if self.generation.is_enabled() && self.generation.model.is_none() {
            bail!(
                "generation.model must be specified when provider is '{:?}'",
                self.generation.provider
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
