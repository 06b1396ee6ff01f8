//! Document scanning and passage preparation.
//!
//! Walks the documents directory, keeps files matching the configured
//! include globs, and turns each one into passages:
//! raw text → [`normalize`] → [`metadata::for_document`] → [`chunk`].

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::{chunk, Chunker};
use crate::config::DocumentsConfig;
use crate::error::{InputError, PersistenceError, Result};
use crate::metadata;
use crate::models::{Passage, RawDocument};
use crate::normalize::normalize;

/// Read every matching document under the configured directory.
///
/// Non-recursive unless `recursive = true`. Results are sorted by relative
/// path so that ingestion order (and therefore tie-breaking in search) is
/// deterministic.
///
/// # Errors
///
/// - [`InputError::DocumentsDirMissing`] if the directory does not exist.
/// - [`InputError::NoDocuments`] if nothing matches.
/// - [`InputError::UnreadableDocument`] if a matching file is not valid UTF-8
///   or cannot be read.
pub fn scan_documents(config: &DocumentsConfig) -> Result<Vec<RawDocument>> {
    let root = &config.dir;
    if !root.is_dir() {
        return Err(InputError::DocumentsDirMissing(root.clone()).into());
    }

    let include_set = build_globset(&config.include_globs)?;
    let max_depth = if config.recursive { usize::MAX } else { 1 };

    let mut docs = Vec::new();

    for entry in WalkDir::new(root).max_depth(max_depth).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root.as_path()).to_path_buf();
            PersistenceError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !include_set.is_match(&rel_str) {
            continue;
        }

        let raw_text = std::fs::read_to_string(path).map_err(|source| {
            InputError::UnreadableDocument {
                path: path.to_path_buf(),
                source,
            }
        })?;

        docs.push(RawDocument {
            path: path.to_path_buf(),
            relative_path: rel_str,
            raw_text,
        });
    }

    if docs.is_empty() {
        return Err(InputError::NoDocuments {
            dir: root.clone(),
            patterns: config.include_globs.join(", "),
        }
        .into());
    }

    docs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(docs)
}

/// Normalize, annotate, and chunk documents into passages.
///
/// Documents that normalize to empty text contribute no passages.
pub fn prepare_passages(docs: &[RawDocument], chunker: &Chunker) -> Vec<Passage> {
    let mut passages = Vec::new();

    for doc in docs {
        let text = normalize(&doc.raw_text);
        if text.is_empty() {
            warn!(document = %doc.relative_path, "document is empty after normalization, skipping");
            continue;
        }

        let meta = metadata::for_document(doc);
        let chunks = chunk(&text, &doc.relative_path, &meta, chunker);
        debug!(
            document = %doc.relative_path,
            chars = text.len(),
            chunks = chunks.len(),
            "chunked document"
        );
        passages.extend(chunks);
    }

    passages
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| InputError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        InputError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        }
        .into()
    })
}
