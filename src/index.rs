//! Flat inner-product vector index with directory persistence.
//!
//! Vectors are stored row-major in one contiguous buffer, parallel to the
//! passage list; row `i` is the embedding of passage `i`. Search is an
//! exhaustive inner product over all rows. Since every stored vector is
//! unit-normalized, inner product equals cosine similarity and the score is
//! bounded to `[-1, 1]`, which callers use directly as a relevance threshold.
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/
//!   vectors.bin     magic "PRVX" | version u32 | dims u32 | count u64 | count×dims f32 (LE)
//!   passages.json   [Passage; count], same order as the vector rows
//!   manifest.json   format version, dims, count, model, SHA-256 of vectors.bin, created_at
//! ```
//!
//! [`VectorIndex::save`] writes into a sibling staging directory and swaps
//! it into place, so readers never observe a half-written index.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, inner_product, vec_to_blob};
use crate::error::{IndexError, InputError, PersistenceError, ProviderError, Result};
use crate::models::Passage;

const VECTORS_FILE: &str = "vectors.bin";
const PASSAGES_FILE: &str = "passages.json";
const MANIFEST_FILE: &str = "manifest.json";

const MAGIC: &[u8; 4] = b"PRVX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    dims: usize,
    count: usize,
    #[serde(default)]
    model: Option<String>,
    vectors_sha256: String,
    created_at: DateTime<Utc>,
}

/// A borrowed view of one stored `(source_id, vector, passage)` triple.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry<'a> {
    pub source_id: &'a str,
    pub vector: &'a [f32],
    pub passage: &'a Passage,
}

/// One search result, borrowing the passage from the index.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub passage: &'a Passage,
    /// Raw inner product with the query.
    pub score: f32,
}

/// Immutable nearest-neighbor index over unit-normalized vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    vectors: Vec<f32>,
    passages: Vec<Passage>,
    model: Option<String>,
}

impl VectorIndex {
    /// Build an index from `(vector, passage)` pairs, preserving their order.
    ///
    /// # Errors
    ///
    /// - [`IndexError::EmptyCorpus`] if `entries` is empty.
    /// - [`ProviderError::DimensionMismatch`] if vector lengths differ.
    pub fn build(entries: Vec<(Vec<f32>, Passage)>) -> Result<Self> {
        let dims = match entries.first() {
            Some((v, _)) => v.len(),
            None => return Err(IndexError::EmptyCorpus.into()),
        };
        if dims == 0 {
            return Err(
                ProviderError::Embedding("provider returned zero-length vectors".to_string())
                    .into(),
            );
        }

        let mut vectors = Vec::with_capacity(entries.len() * dims);
        let mut passages = Vec::with_capacity(entries.len());

        for (vector, passage) in entries {
            if vector.len() != dims {
                return Err(ProviderError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                }
                .into());
            }
            vectors.extend_from_slice(&vector);
            passages.push(passage);
        }

        debug!(entries = passages.len(), dims, "built vector index");

        Ok(Self {
            dims,
            vectors,
            passages,
            model: None,
        })
    }

    /// Record the embedding model the vectors came from (persisted in the manifest).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = IndexEntry<'_>> {
        self.vectors
            .chunks_exact(self.dims)
            .zip(self.passages.iter())
            .map(|(vector, passage)| IndexEntry {
                source_id: &passage.source_id,
                vector,
                passage,
            })
    }

    /// Return the `k` entries with the highest inner product with `query`.
    ///
    /// Results are ordered by descending score; equal scores keep insertion
    /// order. The result holds `min(k, len)` hits.
    ///
    /// # Errors
    ///
    /// - [`InputError::InvalidTopK`] if `k == 0`.
    /// - [`IndexError::QueryDimension`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>> {
        if k == 0 {
            return Err(InputError::InvalidTopK.into());
        }
        if query.len() != self.dims {
            return Err(IndexError::QueryDimension {
                expected: self.dims,
                actual: query.len(),
            }
            .into());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dims)
            .map(|row| inner_product(query, row))
            .enumerate()
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                passage: &self.passages[i],
                score,
            })
            .collect())
    }

    /// Incremental insertion is not supported; rebuild the index instead.
    pub fn add_document(&mut self, _passage: Passage, _vector: Vec<f32>) -> Result<()> {
        Err(IndexError::NotSupported("add_document").into())
    }

    /// Persist the index to `dir`, replacing whatever is there.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let staging = sibling(dir, "staging");
        fs::create_dir_all(&staging).map_err(|e| PersistenceError::io(&staging, e))?;

        if let Err(e) = self
            .write_artifacts(&staging)
            .and_then(|()| install(&staging, dir))
        {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        info!(dir = %dir.display(), entries = self.len(), dims = self.dims, "saved vector index");
        Ok(())
    }

    fn write_artifacts(&self, dir: &Path) -> Result<()> {
        let mut vector_bytes = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        vector_bytes.extend_from_slice(MAGIC);
        vector_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        vector_bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        vector_bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        vector_bytes.extend_from_slice(&vec_to_blob(&self.vectors));

        let passages_json = serde_json::to_vec(&self.passages)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            dims: self.dims,
            count: self.len(),
            model: self.model.clone(),
            vectors_sha256: sha256_hex(&vector_bytes),
            created_at: Utc::now(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;

        write_file(&dir.join(VECTORS_FILE), &vector_bytes)?;
        write_file(&dir.join(PASSAGES_FILE), &passages_json)?;
        write_file(&dir.join(MANIFEST_FILE), &manifest_json)?;
        Ok(())
    }

    /// Load an index previously written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] if `dir` is absent or empty.
    /// - [`IndexError::Corrupt`] if an artifact is missing or malformed, the
    ///   checksum disagrees, or vector and passage counts differ.
    /// - [`PersistenceError::Io`] for other read failures.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() || is_empty_dir(dir)? {
            return Err(IndexError::NotFound(dir.to_path_buf()).into());
        }

        let manifest: Manifest = serde_json::from_slice(&read_artifact(dir, MANIFEST_FILE)?)
            .map_err(|e| corrupt(format!("malformed {}: {}", MANIFEST_FILE, e)))?;

        let vector_bytes = read_artifact(dir, VECTORS_FILE)?;
        if sha256_hex(&vector_bytes) != manifest.vectors_sha256 {
            return Err(corrupt(format!("{} checksum mismatch", VECTORS_FILE)).into());
        }
        let (dims, count, vectors) = decode_vectors(&vector_bytes)?;

        let passages: Vec<Passage> = serde_json::from_slice(&read_artifact(dir, PASSAGES_FILE)?)
            .map_err(|e| corrupt(format!("malformed {}: {}", PASSAGES_FILE, e)))?;

        if passages.len() != count {
            return Err(corrupt(format!(
                "vector store holds {} entries but passage store holds {}",
                count,
                passages.len()
            ))
            .into());
        }
        if manifest.count != count || manifest.dims != dims {
            return Err(corrupt(format!(
                "manifest describes {}×{} but vectors are {}×{}",
                manifest.count, manifest.dims, count, dims
            ))
            .into());
        }

        info!(dir = %dir.display(), entries = count, dims, "loaded vector index");

        Ok(Self {
            dims,
            vectors,
            passages,
            model: manifest.model,
        })
    }
}

fn decode_vectors(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(corrupt(format!("{} has an invalid header", VECTORS_FILE)).into());
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", version)).into());
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let payload = &bytes[HEADER_LEN..];
    let expected_len = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("vector count overflows".to_string()))?;
    if dims == 0 || payload.len() != expected_len {
        return Err(corrupt(format!(
            "{} payload is {} bytes, expected {} for {}×{}",
            VECTORS_FILE,
            payload.len(),
            expected_len,
            count,
            dims
        ))
        .into());
    }

    Ok((dims, count, blob_to_vec(payload)))
}

fn corrupt(message: String) -> IndexError {
    IndexError::Corrupt(message)
}

fn read_artifact(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let path = dir.join(name);
    fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            corrupt(format!("missing {}", name)).into()
        } else {
            PersistenceError::io(path, e).into()
        }
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| PersistenceError::io(path, e).into())
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(dir).map_err(|e| PersistenceError::io(dir, e))?;
    Ok(entries.next().is_none())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Move a fully written `staging` directory to `dir`.
///
/// An existing `dir` is set aside first and restored if the swap fails, so
/// a failed install leaves the previous index where it was.
fn install(staging: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return fs::rename(staging, dir).map_err(|e| PersistenceError::io(dir, e).into());
    }

    let retired = sibling(dir, "retired");
    fs::rename(dir, &retired).map_err(|e| PersistenceError::io(dir, e))?;

    if let Err(e) = fs::rename(staging, dir) {
        if let Err(restore) = fs::rename(&retired, dir) {
            warn!(
                retired = %retired.display(),
                error = %restore,
                "could not restore previous index"
            );
        }
        return Err(PersistenceError::io(dir, e).into());
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(retired = %retired.display(), error = %e, "could not remove previous index");
    }
    Ok(())
}

/// A uniquely named directory next to `dir`, e.g. `.vector_db.staging-<uuid>`.
fn sibling(dir: &Path, purpose: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!(".{}.{}-{}", name, purpose, Uuid::new_v4()))
}
