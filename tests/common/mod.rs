//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use passage_retrieval::config::Config;
use passage_retrieval::embedding::{Embedder, EmbeddingProvider};
use passage_retrieval::error::ProviderError;
use passage_retrieval::EngineOptions;

pub const DIMS: usize = 64;

/// Deterministic bag-of-words embedding: each lowercase alphanumeric word
/// is FNV-hashed into one of `DIMS` buckets.
#[derive(Default)]
pub struct WordHashProvider {
    calls: AtomicUsize,
}

impl WordHashProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn word_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    for word in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_ascii_lowercase();
        v[(fnv1a(&word) % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for WordHashProvider {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| word_vector(t)).collect())
    }
}

pub fn embedder(provider: Arc<WordHashProvider>) -> Embedder {
    Embedder::new(provider, 8, Duration::from_secs(5))
}

pub fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("Physics_2020.txt"),
        "Newton formulated the laws of motion.",
    )
    .unwrap();
    fs::write(
        dir.join("Cooking_1990s.txt"),
        "Bread needs flour, water, salt and yeast. Knead the dough and let it rise.",
    )
    .unwrap();
    fs::write(
        dir.join("Rome_15 March 1944.txt"),
        "The Roman republic was governed by the senate and two consuls.",
    )
    .unwrap();
    fs::write(dir.join("notes.md"), "Markdown is not ingested by default.").unwrap();
}

pub fn options(docs: &Path, index_dir: Option<&Path>) -> EngineOptions {
    let mut config = Config::minimal(docs);
    config.index.dir = index_dir.map(Path::to_path_buf);
    EngineOptions::from_config(&config)
}
