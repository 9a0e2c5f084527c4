//! # Impact Ingest - repository ingestion for code impact analysis
//!
//! Pulls a public git repository, cuts it into content-addressed chunks, embeds
//! them in batches and writes every chunk to two stores: a vector index (Qdrant)
//! for similarity lookups and a property graph (Neo4j) recording which file
//! contains which chunk.
//!
//! ## Overview
//!
//! Chunk ids are derived from `(path, symbol, content)`, so re-ingesting an
//! unchanged repository rewrites the same records and editing one file changes
//! only that file's ids. Both stores upsert by id; there is no transaction across
//! them, and a failed run is repaired by running it again.
//!
//! ## Architecture
//!
//! ```text
//!  repo URL
//!     │
//! ┌───▼────────┐   ┌────────────┐   ┌──────────┐   ┌────────────────┐
//! │ GitFetcher │──▶│FileExtractor│──▶│ batching │──▶│EmbeddingProvider│
//! └────────────┘   └────────────┘   └──────────┘   └───────┬────────┘
//!                                                          │
//!                                  per batch ┌─────────────┤ once, at the end
//!                                            ▼             ▼
//!                                      ┌──────────┐  ┌─────────────┐
//!                                      │GraphStore│  │ VectorIndex │
//!                                      │ (Neo4j)  │  │  (Qdrant)   │
//!                                      └──────────┘  └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`ingest`]: the orchestrator sequencing one run
//! - [`jobs`]: background jobs with a polled state machine
//! - [`fetch`]: clone-or-update of working trees and per-repository locking
//! - [`extract`]: working tree walking, language detection, chunk candidates
//! - [`identity`]: content-addressed chunk ids
//! - [`batching`] and [`tokens`]: embedding batch construction
//! - [`embedding`]: embedding providers
//! - [`vector_db`] and [`graph_db`]: store backends
//! - [`retry`]: backoff for fetch and store writes
//! - [`config`], [`paths`], [`error`], [`types`]
//!
//! ## Usage Example
//!
//! ```no_run
//! use impact_ingest::config::Config;
//! use impact_ingest::ingest::IngestionOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new()?;
//!     let orchestrator = IngestionOrchestrator::from_config(&config)?;
//!
//!     let response = orchestrator.ingest("https://github.com/octocat/Hello-World").await?;
//!     println!("{} chunks", response.chunk_count);
//!     Ok(())
//! }
//! ```

/// Fixed-count and size-bounded batching
pub mod batching;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding providers
pub mod embedding;

/// Error types for every pipeline stage
pub mod error;

/// Chunk extraction from a working tree
pub mod extract;

/// Repository fetching and working tree management
pub mod fetch;

/// Graph store abstraction (Neo4j)
pub mod graph_db;

/// Stable hashing and chunk identity
pub mod identity;

/// Ingestion orchestrator
pub mod ingest;

/// Background ingestion jobs
pub mod jobs;

/// Platform data and config directories
pub mod paths;

/// Retry with exponential backoff
pub mod retry;

/// Token estimation for batch sizing
pub mod tokens;

/// Chunk, request and response types
pub mod types;

/// Vector index abstraction (Qdrant)
pub mod vector_db;
