//! # Passage Retrieval CLI (`passages`)
//!
//! Builds or loads the passage index, answers queries from the command line,
//! and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! passages --config ./config/passages.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `passages build` | Load the persisted index, or build and persist it |
//! | `passages build --rebuild` | Discard the persisted index and rebuild |
//! | `passages query "<text>"` | Print the top passages for a query |
//! | `passages generate "<text>"` | Retrieve context and ask the generation provider |
//! | `passages serve` | Start the HTTP server |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to override the
//! default filter (`passage_retrieval=info`, or `debug` with `--verbose`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use passage_retrieval::config::{self, Config};
use passage_retrieval::generation::{self, Conversation};
use passage_retrieval::server;
use passage_retrieval::RetrievalEngine;

/// Passage retrieval over a local document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/passages.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "passages",
    about = "Passage retrieval over a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/passages.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the persisted index, or build it from the documents directory.
    Build {
        /// Delete the persisted index first and rebuild from scratch.
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the passages most relevant to a query.
    Query {
        query: String,

        /// Number of passages to return (defaults to `retrieval.default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question using retrieved passages as context.
    Generate {
        query: String,

        /// Passages to retrieve (defaults to `retrieval.generate_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum score for a passage to be used as context
        /// (defaults to `retrieval.relevance_threshold`).
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "passage_retrieval=debug"
    } else {
        "passage_retrieval=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { rebuild } => {
            if rebuild {
                discard_index(&cfg)?;
            }
            let engine = RetrievalEngine::from_config(&cfg).await?;
            println!(
                "Index ready: {} passages, {} dimensions ({} start)",
                engine.len(),
                engine.dims(),
                engine.start_mode().as_str()
            );
        }
        Commands::Query { query, top_k, json } => {
            let engine = RetrievalEngine::from_config(&cfg).await?;
            let top_k = top_k.unwrap_or(cfg.retrieval.default_top_k);
            let response = engine.query(&query, top_k).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if response.results.is_empty() {
                println!("No results.");
            } else {
                for r in &response.results {
                    let title = r.metadata.title.as_deref().unwrap_or("(untitled)");
                    let date = r.metadata.date.as_deref().unwrap_or("-");
                    println!("{}. [{:.3}] {} ({})", r.rank, r.score, title, date);
                    println!("   {}", preview(&r.content, 200));
                }
            }
        }
        Commands::Generate {
            query,
            top_k,
            threshold,
        } => {
            if !cfg.generation.is_enabled() {
                bail!("generation provider is disabled; set [generation] provider in the config");
            }
            let generator = generation::create_generator(&cfg.generation)?;
            let engine = RetrievalEngine::from_config(&cfg).await?;

            let answer = generation::answer(
                &engine,
                generator.as_ref(),
                &Conversation::new(),
                &query,
                top_k.unwrap_or(cfg.retrieval.generate_top_k),
                threshold.unwrap_or(cfg.retrieval.relevance_threshold),
            )
            .await?;

            println!("{}", answer.response);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

fn discard_index(cfg: &Config) -> anyhow::Result<()> {
    let Some(dir) = cfg.index.dir.as_deref() else {
        return Ok(());
    };
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove index directory: {}", dir.display()))?;
        println!("Removed persisted index at {}", dir.display());
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
