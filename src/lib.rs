//! # Passage Retrieval
//!
//! Document ingestion and vector retrieval for retrieval-augmented
//! generation.
//!
//! A directory of plain-text documents is normalized, annotated with
//! filename-derived metadata, split into overlapping passages, embedded, and
//! stored in a flat inner-product index that can be persisted and reloaded.
//! Queries are embedded the same way and answered with the best-scoring
//! passages, which can in turn be handed to a chat model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │  Documents  │──▶│ Normalize → Meta → Chunk │──▶│   Embedder   │
//! │  (*.txt)    │   └──────────────────────────┘   └──────┬───────┘
//! └─────────────┘                                         ▼
//!                                                 ┌──────────────┐
//!                                                 │ VectorIndex  │◀── vector_db/
//!                                                 └──────┬───────┘
//!                                                        │
//!                                    ┌───────────────────┤
//!                                    ▼                   ▼
//!                               ┌──────────┐       ┌──────────┐
//!                               │   CLI    │       │   HTTP   │
//!                               │(passages)│       │ (axum)   │
//!                               └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! passages build                       # load or build the index
//! passages query "laws of motion"      # top passages
//! passages generate "who was Newton?"  # retrieve + answer
//! passages serve                       # /retrieve, /generate, /health
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`normalize`] | Text normalization |
//! | [`metadata`] | Filename metadata extraction |
//! | [`chunk`] | Overlapping separator-aware chunking |
//! | [`ingest`] | Document scanning and passage preparation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat vector index and persistence |
//! | [`engine`] | Index lifecycle and query API |
//! | [`generation`] | Chat providers and answer assembly |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
mod http;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod server;

pub use engine::{EngineOptions, RetrievalEngine, StartMode};
pub use error::{Result, RetrievalError};
