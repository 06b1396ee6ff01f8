//! Error taxonomy for ingestion, embedding, indexing, and persistence.
//!
//! Every fallible library operation returns [`Result`], whose error type
//! [`RetrievalError`] groups failures into four kinds. The kind is what
//! callers (CLI, HTTP server) surface to users as a machine-readable code.
//!
//! | Kind | Type | Typical cause |
//! |------|------|---------------|
//! | `input_error` | [`InputError`] | missing documents directory, empty query |
//! | `provider_error` | [`ProviderError`] | embedding/generation backend failure, timeout |
//! | `index_error` | [`IndexError`] | empty corpus, corrupt or missing persisted index |
//! | `persistence_error` | [`PersistenceError`] | I/O failure while saving or loading |

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Invalid caller input or an unusable document corpus.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("documents directory does not exist: {}", .0.display())]
    DocumentsDirMissing(PathBuf),

    #[error("no documents matching {patterns} found in {}", .dir.display())]
    NoDocuments { dir: PathBuf, patterns: String },

    #[error("failed to read document {}: {source}", .path.display())]
    UnreadableDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid include pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("top_k must be a positive integer")]
    InvalidTopK,
}

/// Failure of an external embedding or generation backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("generation provider error: {0}")]
    Generation(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0} provider is disabled")]
    Disabled(&'static str),
}

/// Problems with the vector index itself.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("persisted index is corrupt: {0}")]
    Corrupt(String),

    #[error("no persisted index found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("query vector has {actual} dimensions, index has {expected}")]
    QueryDimension { expected: usize, actual: usize },

    #[error("index build already in progress (lock held at {})", .0.display())]
    Busy(PathBuf),

    #[error("{0} is not supported; rebuild the index instead")]
    NotSupported(&'static str),
}

/// I/O or encoding failure while reading or writing index artifacts.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode index artifact: {0}")]
    Encode(String),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Umbrella error for all library operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RetrievalError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalError::Input(_) => "input_error",
            RetrievalError::Provider(_) => "provider_error",
            RetrievalError::Index(_) => "index_error",
            RetrievalError::Persistence(_) => "persistence_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_per_variant() {
        let err: RetrievalError = InputError::EmptyQuery.into();
        assert_eq!(err.kind(), "input_error");

        let err: RetrievalError = ProviderError::Timeout {
            operation: "embedding",
            secs: 3,
        }
        .into();
        assert_eq!(err.kind(), "provider_error");
        assert_eq!(err.to_string(), "embedding timed out after 3s");

        let err: RetrievalError = IndexError::EmptyCorpus.into();
        assert_eq!(err.kind(), "index_error");

        let err: RetrievalError = PersistenceError::Encode("bad".into()).into();
        assert_eq!(err.kind(), "persistence_error");
    }

    #[test]
    fn test_messages_are_transparent() {
        let err: RetrievalError = IndexError::NotSupported("add_document").into();
        assert_eq!(
            err.to_string(),
            "add_document is not supported; rebuild the index instead"
        );
    }
}
