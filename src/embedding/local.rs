//! In-process embeddings via fastembed (ONNX Runtime, bundled binaries).
//!
//! The model is downloaded from Hugging Face on first use and cached;
//! afterwards embedding runs entirely offline. Inference is CPU-bound, so it
//! runs on the blocking thread pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbeddings {
    model_name: String,
    batch_size: usize,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // Reject unknown names before any download is attempted.
        fastembed_model(&model_name)?;

        Ok(Self {
            model_name,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let model = Arc::clone(&self.model);
        let name = self.model_name.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| ProviderError::Embedding("local model lock poisoned".to_string()))?;

            if guard.is_none() {
                info!(model = %name, "loading local embedding model");
                let options = fastembed::InitOptions::new(fastembed_model(&name)?)
                    .with_show_download_progress(true);
                let loaded = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                    ProviderError::Embedding(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }

            match guard.as_mut() {
                Some(embedding) => embedding
                    .embed(texts, Some(batch_size))
                    .map_err(|e| ProviderError::Embedding(format!("local embedding failed: {}", e))),
                None => Err(ProviderError::Embedding("local model unavailable".to_string())),
            }
        })
        .await
        .map_err(|e| ProviderError::Embedding(format!("local embedding task failed: {}", e)))?
    }
}

fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, ProviderError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(ProviderError::Embedding(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}
