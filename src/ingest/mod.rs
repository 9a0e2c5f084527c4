//! The ingestion pipeline: Fetch → Extract → Batch → Embed → graph writes
//! (per chunk, as batches complete) → one vector write at the end.
//!
//! The two stores are not written transactionally. Both key on the
//! content-derived chunk id, so a run that fails half way is repaired by
//! running it again.

use crate::batching::batch_by_size;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, provider_from_config};
use crate::error::{
    EmbeddingError, ExtractionError, FetchError, IngestError, StoreWriteError,
};
use crate::extract::{ChunkExtractor, ExtractionOutput, FileExtractor};
use crate::fetch::{GitFetcher, RepoFetcher, RepoLocks, normalize_repo_url};
use crate::graph_db::{GraphStore, InMemoryGraphStore, Neo4jGraphStore};
use crate::retry::RetryPolicy;
use crate::tokens::estimate_tokens;
use crate::types::{Chunk, DistanceMetric, EmbeddedChunk, IngestResponse, IngestStage};
use crate::vector_db::{InMemoryVectorIndex, QdrantVectorIndex, VectorIndex};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Return early with [`IngestError::Cancelled`] if cancellation was requested
macro_rules! check_cancelled {
    ($cancel:expr, $stage:expr) => {
        if $cancel.is_cancelled() {
            tracing::info!("Ingestion cancelled before {} stage", $stage);
            return Err(IngestError::Cancelled { stage: $stage });
        }
    };
}

/// Pipeline tuning taken from [`Config`]
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub collection: String,
    pub distance: DistanceMetric,
    pub max_batch_tokens: usize,
    pub max_batch_items: usize,
    pub max_workers: usize,
    pub embed_timeout: Duration,
    pub graph_concurrency: usize,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.vector_db.collection_name.clone(),
            distance: config.vector_db.distance,
            max_batch_tokens: config.embedding.max_batch_tokens,
            max_batch_items: config.embedding.max_batch_items,
            max_workers: config.embedding.max_workers.max(1),
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            graph_concurrency: config.graph_db.max_concurrency.max(1),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Sequences one ingestion run across the fetcher, extractor, embedding
/// provider and both stores
///
/// All collaborators are injected, so tests can substitute fakes for any of
/// them.
pub struct IngestionOrchestrator {
    fetcher: Arc<dyn RepoFetcher>,
    extractor: Arc<dyn ChunkExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    settings: IngestSettings,
    retry: RetryPolicy,
    repo_locks: RepoLocks,
}

impl IngestionOrchestrator {
    pub fn new(
        fetcher: Arc<dyn RepoFetcher>,
        extractor: Arc<dyn ChunkExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            embedder,
            vectors,
            graph,
            settings,
            retry: RetryPolicy::default(),
            repo_locks: RepoLocks::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build an orchestrator talking to Qdrant and Neo4j as configured
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        let vectors = QdrantVectorIndex::from_config(&config.vector_db).map_err(|e| {
            StoreWriteError::CollectionSetup {
                collection: config.vector_db.collection_name.clone(),
                reason: format!("{:#}", e),
            }
        })?;
        let graph = Neo4jGraphStore::new(&config.graph_db)
            .map_err(|e| StoreWriteError::SchemaSetup(format!("{:#}", e)))?;

        Self::with_stores(config, Arc::new(vectors), Arc::new(graph))
    }

    /// Build an orchestrator whose stores live in this process
    pub fn in_memory(config: &Config) -> Result<Self, IngestError> {
        Self::with_stores(
            config,
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryGraphStore::new()),
        )
    }

    fn with_stores(
        config: &Config,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
    ) -> Result<Self, IngestError> {
        let extractor = FileExtractor::new(&config.extraction)?;
        let embedder = provider_from_config(&config.embedding)?;

        Ok(Self::new(
            Arc::new(GitFetcher::from_config(&config.fetch)),
            Arc::new(extractor),
            embedder,
            vectors,
            graph,
            IngestSettings::from_config(config),
        )
        .with_retry_policy(RetryPolicy::from_config(&config.retry)))
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// Ingest a repository, returning its chunk count or the failing stage
    pub async fn ingest(&self, repo_url: &str) -> Result<IngestResponse, IngestError> {
        self.ingest_with(repo_url, &CancellationToken::new(), &|_| {})
            .await
    }

    /// Ingest with cooperative cancellation; `on_stage` is told when each
    /// stage begins
    pub async fn ingest_with(
        &self,
        repo_url: &str,
        cancel: &CancellationToken,
        on_stage: &(dyn Fn(IngestStage) + Send + Sync),
    ) -> Result<IngestResponse, IngestError> {
        let start = Instant::now();
        let url = normalize_repo_url(repo_url)?;
        tracing::info!("Starting ingestion of {}", url);

        // Fetch and extract under the per-URL lock so concurrent runs for the
        // same repository never see a half-updated working tree
        let extraction = {
            check_cancelled!(cancel, IngestStage::Fetch);
            let _repo_lock = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(IngestError::Cancelled { stage: IngestStage::Fetch });
                }
                guard = self.repo_locks.acquire(&url) => guard,
            };

            on_stage(IngestStage::Fetch);
            let path = self.fetch(&url, cancel).await?;

            check_cancelled!(cancel, IngestStage::Extract);
            on_stage(IngestStage::Extract);
            self.extract(path, cancel).await?
        };

        let mut warnings = Vec::new();
        let files_skipped = extraction.skipped.len();
        if files_skipped > 0 {
            warnings.push(format!("{} file(s) could not be read and were skipped", files_skipped));
        }

        let chunks = assign_ids(extraction, &mut warnings)?;
        if chunks.is_empty() {
            tracing::warn!("No chunks extracted from {}", url);
            warnings.push("No text files found; nothing was written".to_string());
            return Ok(IngestResponse {
                repo_url: url,
                chunk_count: 0,
                chunk_ids: Vec::new(),
                files_skipped,
                embedding_batches: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                warnings,
            });
        }

        check_cancelled!(cancel, IngestStage::Embed);
        self.prepare_stores(cancel).await?;

        on_stage(IngestStage::Embed);
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let (embedded, embedding_batches) = self.embed_and_link(chunks, cancel).await?;

        check_cancelled!(cancel, IngestStage::VectorWrite);
        on_stage(IngestStage::VectorWrite);
        let written = self.write_vectors(&embedded, cancel).await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Ingested {}: {} chunks in {} embedding batches ({} ms)",
            url,
            written,
            embedding_batches,
            duration_ms
        );

        Ok(IngestResponse {
            repo_url: url,
            chunk_count: written,
            chunk_ids,
            files_skipped,
            embedding_batches,
            duration_ms,
            warnings,
        })
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<PathBuf, IngestError> {
        self.retry
            .run("fetch", IngestStage::Fetch, cancel, move || async move {
                self.fetcher
                    .fetch(url)
                    .await
                    .map_err(|e| fetch_error(url, e))
            })
            .await
    }

    async fn extract(
        &self,
        root: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<ExtractionOutput, IngestError> {
        let extractor = self.extractor.clone();
        let token = cancel.clone();

        let result = tokio::task::spawn_blocking(move || extractor.extract(&root, &token))
            .await
            .map_err(|e| ExtractionError::WalkFailed(format!("extraction task failed: {}", e)))?;

        result.map_err(|e| {
            if cancel.is_cancelled() {
                return IngestError::Cancelled {
                    stage: IngestStage::Extract,
                };
            }
            match e.downcast::<ExtractionError>() {
                Ok(err) => err.into(),
                Err(other) => ExtractionError::WalkFailed(format!("{:#}", other)).into(),
            }
        })
    }

    /// Idempotent setup of the graph constraints and the vector collection
    async fn prepare_stores(&self, cancel: &CancellationToken) -> Result<(), IngestError> {
        self.retry
            .run("graph schema setup", IngestStage::GraphWrite, cancel, move || async move {
                self.graph.ensure_schema().await.map_err(|e| {
                    IngestError::from(StoreWriteError::SchemaSetup(format!("{:#}", e)))
                })
            })
            .await?;

        let collection = &self.settings.collection;
        let dimension = self.embedder.dimension();
        self.retry
            .run("collection setup", IngestStage::VectorWrite, cancel, move || async move {
                self.vectors
                    .ensure_collection(collection, dimension, self.settings.distance)
                    .await
                    .map_err(|e| {
                        IngestError::from(StoreWriteError::CollectionSetup {
                            collection: collection.clone(),
                            reason: format!("{:#}", e),
                        })
                    })
            })
            .await
    }

    /// Embed every chunk, merging graph nodes for each batch as it completes
    ///
    /// Returns the embedded chunks in extraction order and the number of
    /// embedding calls made. Nothing is written to the vector index here.
    async fn embed_and_link(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<EmbeddedChunk>, usize), IngestError> {
        let total = chunks.len();
        let batches = batch_by_size(
            chunks,
            |c: &Chunk| estimate_tokens(&c.content),
            self.settings.max_batch_tokens,
            Some(self.settings.max_batch_items),
        );
        let batch_count = batches.len();
        tracing::debug!("Embedding {} chunks in {} batches", total, batch_count);

        let dimension = self.embedder.dimension();
        let timeout = self.settings.embed_timeout;
        let mut results = stream::iter(batches)
            .map(|batch| {
                let embedder = self.embedder.clone();
                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                async move {
                    let vectors = embed_texts(embedder, texts, dimension, timeout).await;
                    (batch, vectors)
                }
            })
            .buffered(self.settings.max_workers);

        let mut embedded = Vec::with_capacity(total);
        let mut done = 0usize;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Embedding cancelled after {}/{} batches", done, batch_count);
                    return Err(IngestError::Cancelled { stage: IngestStage::Embed });
                }
                next = results.next() => next,
            };
            let Some((batch, vectors)) = next else {
                break;
            };
            let vectors = vectors?;

            self.link_batch(&batch, cancel).await?;

            embedded.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
            );
            done += 1;
            tracing::debug!("Batch {}/{} embedded and linked", done, batch_count);
        }

        Ok((embedded, batch_count))
    }

    /// Merge the graph nodes for one embedded batch
    async fn link_batch(&self, batch: &[Chunk], cancel: &CancellationToken) -> Result<(), IngestError> {
        let upserts: Vec<_> = batch
            .iter()
            .map(|chunk| {
                self.retry
                    .run("graph upsert", IngestStage::GraphWrite, cancel, move || async move {
                        self.graph
                            .upsert_code_node(&chunk.id, &chunk.path, &chunk.symbol, chunk.kind)
                            .await
                            .map_err(|e| {
                                IngestError::from(StoreWriteError::Graph(format!(
                                    "{}: {:#}",
                                    chunk.path, e
                                )))
                            })
                    })
            })
            .collect();
        stream::iter(upserts)
            .buffer_unordered(self.settings.graph_concurrency)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn write_vectors(
        &self,
        embedded: &[EmbeddedChunk],
        cancel: &CancellationToken,
    ) -> Result<usize, IngestError> {
        if embedded.is_empty() {
            return Ok(0);
        }

        let collection = &self.settings.collection;
        self.retry
            .run("vector upsert", IngestStage::VectorWrite, cancel, move || async move {
                self.vectors
                    .upsert_chunks(collection, embedded)
                    .await
                    .map_err(|e| IngestError::from(StoreWriteError::Vector(format!("{:#}", e))))
            })
            .await
    }
}

/// Run one provider call off the async runtime and check its output shape
async fn embed_texts(
    embedder: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    dimension: usize,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, IngestError> {
    let expected = texts.len();
    let task = tokio::task::spawn_blocking(move || embedder.embed_batch(texts));

    let vectors = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(vectors))) => vectors,
        Ok(Ok(Err(e))) => return Err(EmbeddingError::GenerationFailed(format!("{:#}", e)).into()),
        Ok(Err(e)) => return Err(EmbeddingError::TaskPanicked(e.to_string()).into()),
        Err(_) => return Err(EmbeddingError::Timeout(timeout.as_secs()).into()),
    };

    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: vectors.len(),
        }
        .into());
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        }
        .into());
    }
    Ok(vectors)
}

/// Turn candidates into identified chunks, dropping repeated ids
fn assign_ids(
    extraction: ExtractionOutput,
    warnings: &mut Vec<String>,
) -> Result<Vec<Chunk>, IngestError> {
    let mut seen = HashSet::new();
    let mut chunks = Vec::with_capacity(extraction.candidates.len());
    for candidate in extraction.candidates {
        let chunk = Chunk::from_candidate(candidate)?;
        if seen.insert(chunk.id.clone()) {
            chunks.push(chunk);
        } else {
            warnings.push(format!("Duplicate chunk {} ({}) ignored", chunk.id, chunk.path));
        }
    }
    Ok(chunks)
}

fn fetch_error(url: &str, err: anyhow::Error) -> IngestError {
    match err.downcast::<FetchError>() {
        Ok(fetch) => fetch.into(),
        Err(other) => FetchError::CloneFailed {
            url: url.to_string(),
            reason: format!("{:#}", other),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests;
