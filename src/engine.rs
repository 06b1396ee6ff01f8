//! Retrieval engine: index lifecycle and the query API.
//!
//! A [`RetrievalEngine`] only exists once its index is ready. It gets there
//! one of two ways:
//!
//! - **Warm start**: the configured index directory holds a valid persisted
//!   index, which is loaded as-is.
//! - **Cold start**: documents are scanned, normalized, annotated, chunked,
//!   embedded, and indexed; the result is persisted when an index directory
//!   is configured.
//!
//! Cold builds against a persisted directory hold an exclusive OS lock on
//! `<index_dir>.lock` for their whole duration, so two processes never build
//! the same index at once. The lock dies with its holder; a lock file left
//! behind by a crashed build is simply reused.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::config::{ChunkingConfig, Config, DocumentsConfig};
use crate::embedding::Embedder;
use crate::error::{IndexError, InputError, PersistenceError, Result, RetrievalError};
use crate::index::VectorIndex;
use crate::ingest;
use crate::models::{Passage, QueryResponse, RetrievedPassage};

/// Everything [`RetrievalEngine::initialize`] needs besides the embedder.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub documents: DocumentsConfig,
    pub chunking: ChunkingConfig,
    /// Persisted index location. `None` builds in memory on every start.
    pub index_dir: Option<PathBuf>,
    /// Rebuild instead of failing when the persisted index is corrupt.
    pub rebuild_on_corrupt: bool,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            documents: config.documents.clone(),
            chunking: config.chunking.clone(),
            index_dir: config.index.dir.clone(),
            rebuild_on_corrupt: config.index.rebuild_on_corrupt,
        }
    }
}

/// How the engine's index came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Built from the documents directory.
    Cold,
    /// Loaded from a persisted index.
    Warm,
}

impl StartMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StartMode::Cold => "cold",
            StartMode::Warm => "warm",
        }
    }
}

/// A ready-to-query retrieval engine.
///
/// Queries take `&self` and only read the index, so one engine can be
/// shared behind `Arc` by any number of concurrent callers.
pub struct RetrievalEngine {
    index: VectorIndex,
    embedder: Embedder,
    start_mode: StartMode,
}

impl RetrievalEngine {
    /// Load the persisted index, or build one from the documents directory.
    ///
    /// # Errors
    ///
    /// Any ingestion, provider, index, or persistence error aborts
    /// initialization; no partially built engine is returned.
    pub async fn initialize(embedder: Embedder, options: EngineOptions) -> Result<Self> {
        let Some(index_dir) = options.index_dir.as_deref() else {
            let index = build_index(&embedder, &options).await?;
            return Ok(Self::ready(index, embedder, StartMode::Cold));
        };

        if let Some(index) = try_load(index_dir, &embedder, options.rebuild_on_corrupt)? {
            return Ok(Self::ready(index, embedder, StartMode::Warm));
        }

        let _lock = BuildLock::acquire(index_dir)?;

        // Another builder may have finished while we waited for the lock.
        if let Some(index) = try_load(index_dir, &embedder, options.rebuild_on_corrupt)? {
            return Ok(Self::ready(index, embedder, StartMode::Warm));
        }

        let index = build_index(&embedder, &options).await?;
        index.save(index_dir)?;
        Ok(Self::ready(index, embedder, StartMode::Cold))
    }

    /// Create the configured embedding provider and initialize from `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = Embedder::from_config(&config.embedding)?;
        Self::initialize(embedder, EngineOptions::from_config(config)).await
    }

    fn ready(index: VectorIndex, embedder: Embedder, start_mode: StartMode) -> Self {
        info!(
            mode = start_mode.as_str(),
            passages = index.len(),
            dims = index.dims(),
            model = embedder.model_name(),
            "retrieval engine ready"
        );
        Self {
            index,
            embedder,
            start_mode,
        }
    }

    /// Return the `top_k` passages most similar to `text`, best first.
    ///
    /// Fewer than `top_k` results are returned only when the index holds
    /// fewer passages.
    ///
    /// # Errors
    ///
    /// - [`InputError::EmptyQuery`] for an empty or whitespace-only query.
    /// - [`InputError::InvalidTopK`] if `top_k == 0`.
    /// - Provider errors from embedding the query.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<QueryResponse> {
        if text.trim().is_empty() {
            return Err(InputError::EmptyQuery.into());
        }
        if top_k == 0 {
            return Err(InputError::InvalidTopK.into());
        }

        let vector = self.embedder.embed_one(text).await?;
        let hits = self.index.search(&vector, top_k)?;
        debug!(top_k, hits = hits.len(), "query answered");

        let results = hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| RetrievedPassage {
                rank: i + 1,
                content: hit.passage.text.clone(),
                score: hit.score,
                metadata: hit.passage.metadata.clone(),
                source_id: hit.passage.source_id.clone(),
            })
            .collect();

        Ok(QueryResponse {
            query: text.to_string(),
            results,
        })
    }

    /// Incremental ingestion is not supported; rebuild the index instead.
    pub fn add_document(&mut self, _path: &Path) -> Result<()> {
        Err(IndexError::NotSupported("add_document").into())
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    pub fn passages(&self) -> &[Passage] {
        self.index.passages()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }
}

/// Load a persisted index if one is usable.
///
/// `Ok(None)` means "build from scratch": nothing is persisted yet, or the
/// persisted index is corrupt and rebuilding is allowed.
fn try_load(
    index_dir: &Path,
    embedder: &Embedder,
    rebuild_on_corrupt: bool,
) -> Result<Option<VectorIndex>> {
    match VectorIndex::load(index_dir) {
        Ok(index) => {
            if let Some(stored) = index.model() {
                if stored != embedder.model_name() {
                    warn!(
                        stored,
                        configured = embedder.model_name(),
                        "persisted index was built with a different embedding model"
                    );
                }
            }
            embedder.pin_dims(index.dims())?;
            Ok(Some(index))
        }
        Err(RetrievalError::Index(IndexError::NotFound(_))) => {
            debug!(dir = %index_dir.display(), "no persisted index");
            Ok(None)
        }
        Err(RetrievalError::Index(IndexError::Corrupt(reason))) if rebuild_on_corrupt => {
            warn!(dir = %index_dir.display(), %reason, "persisted index is corrupt, rebuilding");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn build_index(embedder: &Embedder, options: &EngineOptions) -> Result<VectorIndex> {
    let docs = ingest::scan_documents(&options.documents)?;
    let chunker = Chunker::from_config(&options.chunking);
    let passages = ingest::prepare_passages(&docs, &chunker);

    info!(
        documents = docs.len(),
        passages = passages.len(),
        "embedding passages"
    );

    let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
    let vectors = embedder.embed_many(&texts).await?;

    let index = VectorIndex::build(vectors.into_iter().zip(passages).collect())?
        .with_model(embedder.model_name());
    Ok(index)
}

/// Exclusive OS lock on `<index_dir>.lock`, held while a cold build runs.
///
/// The lock lives on the open handle, not the file: it is released when the
/// guard drops or the process dies, so a leftover file never blocks a later
/// build. The file itself stays in place and records the holder's PID.
struct BuildLock {
    _file: File,
}

impl BuildLock {
    fn acquire(index_dir: &Path) -> Result<Self> {
        let path = lock_path(index_dir);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(IndexError::Busy(path).into()),
            Err(TryLockError::Error(e)) => return Err(PersistenceError::io(path, e).into()),
        }

        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|e| PersistenceError::io(&path, e))?;
        debug!(lock = %path.display(), "acquired build lock");
        Ok(Self { _file: file })
    }
}

fn lock_path(index_dir: &Path) -> PathBuf {
    let mut name = index_dir.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Embeds each text as letter frequencies over `a..z`.
    struct LetterProvider;

    #[async_trait]
    impl EmbeddingProvider for LetterProvider {
        fn model_name(&self) -> &str {
            "letters"
        }

        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    for c in t.chars().filter(|c| c.is_ascii_lowercase()) {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn embedder() -> Embedder {
        Embedder::new(Arc::new(LetterProvider), 16, Duration::from_secs(5))
    }

    fn options(docs: &Path, index_dir: Option<PathBuf>) -> EngineOptions {
        let mut config = Config::minimal(docs);
        config.index.dir = index_dir;
        EngineOptions::from_config(&config)
    }

    fn write_corpus(dir: &Path) {
        fs::write(dir.join("Alpha_2020.txt"), "aaaa aaaa.").unwrap();
        fs::write(dir.join("Bravo_1990s.txt"), "bbbb bbbb.").unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_cold_start() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());

        let engine = RetrievalEngine::initialize(embedder(), options(tmp.path(), None))
            .await
            .unwrap();
        assert_eq!(engine.start_mode(), StartMode::Cold);
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.dims(), 26);

        let response = engine.query("aaa", 1).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].rank, 1);
        assert_eq!(response.results[0].metadata.title.as_deref(), Some("Alpha"));
    }

    #[tokio::test]
    async fn test_query_validation() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let engine = RetrievalEngine::initialize(embedder(), options(tmp.path(), None))
            .await
            .unwrap();

        assert!(matches!(
            engine.query("   ", 3).await.unwrap_err(),
            RetrievalError::Input(InputError::EmptyQuery)
        ));
        assert!(matches!(
            engine.query("a", 0).await.unwrap_err(),
            RetrievalError::Input(InputError::InvalidTopK)
        ));
    }

    #[tokio::test]
    async fn test_busy_lock() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        write_corpus(&docs);
        let index_dir = tmp.path().join("vector_db");

        let held = BuildLock::acquire(&index_dir).unwrap();
        let err = RetrievalEngine::initialize(embedder(), options(&docs, Some(index_dir.clone())))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Index(IndexError::Busy(_))));

        drop(held);
        let engine = RetrievalEngine::initialize(embedder(), options(&docs, Some(index_dir)))
            .await
            .unwrap();
        assert_eq!(engine.start_mode(), StartMode::Cold);
    }

    #[tokio::test]
    async fn test_corrupt_index_without_rebuild_fails() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        write_corpus(&docs);
        let index_dir = tmp.path().join("vector_db");
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(index_dir.join("manifest.json"), "not json").unwrap();

        let mut opts = options(&docs, Some(index_dir.clone()));
        opts.rebuild_on_corrupt = false;
        let err = RetrievalEngine::initialize(embedder(), opts)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Index(IndexError::Corrupt(_))));

        let engine = RetrievalEngine::initialize(embedder(), options(&docs, Some(index_dir)))
            .await
            .unwrap();
        assert_eq!(engine.start_mode(), StartMode::Cold);
    }

    #[tokio::test]
    async fn test_add_document_not_supported() {
        let tmp = TempDir::new().unwrap();
        write_corpus(tmp.path());
        let mut engine = RetrievalEngine::initialize(embedder(), options(tmp.path(), None))
            .await
            .unwrap();
        let err = engine.add_document(Path::new("new.txt")).unwrap_err();
        assert!(matches!(err, RetrievalError::Index(IndexError::NotSupported(_))));
    }

    #[test]
    fn test_lock_records_holder_pid() {
        let tmp = TempDir::new().unwrap();
        let index_dir = tmp.path().join("nested").join("vector_db");
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(lock_path(&index_dir), "99999999\nleftover\n").unwrap();

        let held = BuildLock::acquire(&index_dir).unwrap();
        let contents = fs::read_to_string(lock_path(&index_dir)).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));

        assert!(matches!(
            BuildLock::acquire(&index_dir).err().unwrap(),
            RetrievalError::Index(IndexError::Busy(_))
        ));
        drop(held);
        assert!(BuildLock::acquire(&index_dir).is_ok());
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/data/vector_db")),
            PathBuf::from("/data/vector_db.lock")
        );
    }
}
