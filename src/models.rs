//! Core data models used throughout the retrieval pipeline.
//!
//! These types represent the documents, passages, and query results that
//! flow from ingestion through the vector index to callers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file read from the documents directory, before normalization.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub path: PathBuf,
    /// Path relative to the documents root, `/`-separated.
    pub relative_path: String,
    pub raw_text: String,
}

impl RawDocument {
    /// File name component of the relative path.
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Parent directory relative to the documents root, if the file is nested.
    pub fn parent_dir(&self) -> Option<&str> {
        self.relative_path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .filter(|p| !p.is_empty())
    }
}

/// Structured fields attached to every passage of a document.
///
/// Keys are only present when derivable; absent fields are omitted from
/// the serialized mapping rather than written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// ISO-8601 date, bare year, or decade year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// The atomic retrievable unit: one chunk of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier (UUID v4).
    pub source_id: String,
    /// Normalized, chunked text. Never empty.
    pub text: String,
    pub metadata: Metadata,
    /// Relative path of the source document.
    pub document: String,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
}

/// One ranked passage in a [`QueryResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// 1-based rank.
    pub rank: usize,
    pub content: String,
    /// Raw inner product with the query vector.
    pub score: f32,
    pub metadata: Metadata,
    pub source_id: String,
}

/// Result of [`RetrievalEngine::query`](crate::engine::RetrievalEngine::query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<RetrievedPassage>,
}
