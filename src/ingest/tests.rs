use super::*;
use crate::config::ExtractionConfig;
use crate::embedding::HashEmbedder;
use crate::fetch::LocalPathFetcher;
use crate::identity::derive_chunk_id;
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const COLLECTION: &str = "impact_chunks";

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

fn two_file_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.py"), "from utils.helper import helper\nhelper()\n").unwrap();
    std::fs::create_dir_all(dir.path().join("utils")).unwrap();
    std::fs::write(dir.path().join("utils/helper.py"), "def helper():\n    return 1\n").unwrap();
    dir
}

fn url_of(dir: &Path) -> String {
    dir.to_string_lossy().to_string()
}

struct Harness {
    orchestrator: IngestionOrchestrator,
    vectors: Arc<InMemoryVectorIndex>,
    graph: Arc<InMemoryGraphStore>,
}

fn harness_with(
    fetcher: Arc<dyn RepoFetcher>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: IngestSettings,
) -> Harness {
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let graph = Arc::new(InMemoryGraphStore::new());
    let orchestrator = IngestionOrchestrator::new(
        fetcher,
        Arc::new(FileExtractor::new(&ExtractionConfig::default()).unwrap()),
        embedder,
        vectors.clone(),
        graph.clone(),
        settings,
    )
    .with_retry_policy(fast_retry());
    Harness {
        orchestrator,
        vectors,
        graph,
    }
}

fn harness() -> Harness {
    harness_with(
        Arc::new(LocalPathFetcher),
        Arc::new(HashEmbedder::default()),
        IngestSettings::default(),
    )
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Local fetcher that records how many fetches overlap
#[derive(Default)]
struct OverlapFetcher {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait::async_trait]
impl RepoFetcher for OverlapFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        LocalPathFetcher.fetch(repo_url).await
    }
}

#[derive(Default)]
struct UnreachableFetcher {
    attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl RepoFetcher for UnreachableFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<PathBuf> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::CloneFailed {
            url: repo_url.to_string(),
            reason: "could not resolve host".to_string(),
        }
        .into())
    }
}

struct BrokenEmbedder;

impl EmbeddingProvider for BrokenEmbedder {
    fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("model crashed")
    }
    fn dimension(&self) -> usize {
        64
    }
    fn model_name(&self) -> &str {
        "broken"
    }
}

/// Claims one dimension, returns another
struct LyingEmbedder;

impl EmbeddingProvider for LyingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; 8]).collect())
    }
    fn dimension(&self) -> usize {
        64
    }
    fn model_name(&self) -> &str {
        "lying"
    }
}

/// Cancels the run from inside the first embedding call
struct CancellingEmbedder {
    cancel: CancellationToken,
    inner: HashEmbedder,
}

impl EmbeddingProvider for CancellingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.cancel.cancel();
        std::thread::sleep(Duration::from_millis(20));
        self.inner.embed_batch(texts)
    }
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
    fn model_name(&self) -> &str {
        "cancelling"
    }
}

/// Records the size of every batch it is asked to embed
#[derive(Default)]
struct RecordingEmbedder {
    inner: HashEmbedder,
    batch_sizes: Mutex<Vec<usize>>,
}

impl EmbeddingProvider for RecordingEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.batch_sizes.lock().unwrap().push(texts.len());
        self.inner.embed_batch(texts)
    }
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
    fn model_name(&self) -> &str {
        "recording"
    }
}

/// In-memory index whose first `failures` upserts fail
struct FlakyVectorIndex {
    inner: InMemoryVectorIndex,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyVectorIndex {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryVectorIndex::new(),
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl VectorIndex for FlakyVectorIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, distance: DistanceMetric) -> Result<()> {
        self.inner.ensure_collection(name, dimension, distance).await
    }

    async fn upsert_chunks(&self, collection: &str, batch: &[EmbeddedChunk]) -> Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("connection reset by peer");
        }
        self.inner.upsert_chunks(collection, batch).await
    }

    async fn point_count(&self, collection: &str) -> Result<u64> {
        self.inner.point_count(collection).await
    }
}

struct DownGraphStore;

#[async_trait::async_trait]
impl GraphStore for DownGraphStore {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }
    async fn upsert_code_node(
        &self,
        _id: &str,
        _path: &str,
        _symbol: &str,
        _kind: crate::types::ChunkKind,
    ) -> Result<()> {
        anyhow::bail!("ServiceUnavailable")
    }
    async fn node_count(&self) -> Result<u64> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Pipeline behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_file_repository_ingests_two_chunks() {
    let repo = two_file_repo();
    let h = harness();

    let response = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap();

    assert_eq!(response.chunk_count, 2);
    assert_eq!(response.files_skipped, 0);
    assert_eq!(
        response.chunk_ids,
        vec![
            derive_chunk_id("main.py", "main", "from utils.helper import helper\nhelper()\n"),
            derive_chunk_id("utils/helper.py", "helper", "def helper():\n    return 1\n"),
        ]
    );

    assert_eq!(h.vectors.point_count(COLLECTION).await.unwrap(), 2);
    assert_eq!(h.vectors.upsert_calls(), 1, "vectors are written in one call");
    assert_eq!(h.graph.node_count().await.unwrap(), 4);
    assert_eq!(h.graph.contained_in("utils/helper.py"), vec![response.chunk_ids[1].clone()]);
    assert!(h.graph.schema_ready());

    let stored = h.vectors.get(COLLECTION, &response.chunk_ids[0]).unwrap();
    assert_eq!(stored.chunk.path, "main.py");
    assert_eq!(stored.chunk.language.as_deref(), Some("python"));
    assert_eq!(stored.vector.len(), 64);
}

#[tokio::test]
async fn test_reingest_unchanged_repository_is_idempotent() {
    let repo = two_file_repo();
    let h = harness();
    let url = url_of(repo.path());

    let first = h.orchestrator.ingest(&url).await.unwrap();
    let second = h.orchestrator.ingest(&url).await.unwrap();

    assert_eq!(first.chunk_ids, second.chunk_ids);
    assert_eq!(h.vectors.point_count(COLLECTION).await.unwrap(), 2);
    assert_eq!(h.graph.node_count().await.unwrap(), 4);
    assert_eq!(h.graph.edge_count(), 2);
}

#[tokio::test]
async fn test_editing_one_file_changes_exactly_one_id() {
    let repo = two_file_repo();
    let h = harness();
    let url = url_of(repo.path());

    let before: BTreeSet<String> = h.orchestrator.ingest(&url).await.unwrap().chunk_ids.into_iter().collect();
    std::fs::write(repo.path().join("main.py"), "print('edited')\n").unwrap();
    let after: BTreeSet<String> = h.orchestrator.ingest(&url).await.unwrap().chunk_ids.into_iter().collect();

    assert_eq!(before.len(), 2);
    assert_eq!(after.len(), 2);
    assert_eq!(before.intersection(&after).count(), 1);
    assert!(after.contains(&derive_chunk_id("main.py", "main", "print('edited')\n")));

    // Stale chunks are not removed: both versions of main.py remain
    assert_eq!(h.vectors.point_count(COLLECTION).await.unwrap(), 3);
    assert_eq!(h.graph.contained_in("main.py").len(), 2);
}

#[tokio::test]
async fn test_empty_repository_writes_nothing() {
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join("blank.txt"), "   \n").unwrap();
    let h = harness();

    let response = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap();

    assert_eq!(response.chunk_count, 0);
    assert_eq!(response.embedding_batches, 0);
    assert!(response.warnings.iter().any(|w| w.contains("nothing was written")));
    assert_eq!(h.vectors.upsert_calls(), 0);
    assert_eq!(h.graph.upsert_calls(), 0);
}

#[tokio::test]
async fn test_unreadable_files_are_skipped_not_fatal() {
    let repo = two_file_repo();
    let mut latin1 = b"caf".to_vec();
    latin1.push(0xe9);
    latin1.extend_from_slice(&[b'x'; 100]);
    std::fs::write(repo.path().join("notes.txt"), latin1).unwrap();
    let h = harness();

    let response = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap();

    assert_eq!(response.chunk_count, 2);
    assert_eq!(response.files_skipped, 1);
    assert_eq!(response.warnings.len(), 1);
}

#[tokio::test]
async fn test_size_bounded_batches_drive_embedding_calls() {
    let repo = TempDir::new().unwrap();
    for i in 0..5 {
        std::fs::write(repo.path().join(format!("f{}.txt", i)), format!("file number {}", i)).unwrap();
    }
    let embedder = Arc::new(RecordingEmbedder::default());
    let settings = IngestSettings {
        max_batch_items: 2,
        ..IngestSettings::default()
    };
    let h = harness_with(Arc::new(LocalPathFetcher), embedder.clone(), settings);

    let response = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap();

    assert_eq!(response.chunk_count, 5);
    assert_eq!(response.embedding_batches, 3);
    let mut sizes = embedder.batch_sizes.lock().unwrap().clone();
    sizes.sort();
    assert_eq!(sizes, vec![1, 2, 2]);
    assert_eq!(h.vectors.upsert_calls(), 1);
}

#[tokio::test]
async fn test_stage_notifications_in_order() {
    let repo = two_file_repo();
    let h = harness();
    let stages = Mutex::new(Vec::new());

    h.orchestrator
        .ingest_with(&url_of(repo.path()), &CancellationToken::new(), &|stage| {
            stages.lock().unwrap().push(stage)
        })
        .await
        .unwrap();

    assert_eq!(
        stages.into_inner().unwrap(),
        vec![
            IngestStage::Fetch,
            IngestStage::Extract,
            IngestStage::Embed,
            IngestStage::VectorWrite
        ]
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_url_is_a_validation_error() {
    let h = harness();
    let err = h.orchestrator.ingest("not a repository").await.unwrap_err();
    assert!(err.is_user_error());
    assert_eq!(err.stage(), None);
}

#[tokio::test]
async fn test_fetch_failure_is_retried_then_reported() {
    let fetcher = Arc::new(UnreachableFetcher::default());
    let h = harness_with(fetcher.clone(), Arc::new(HashEmbedder::default()), IngestSettings::default());

    let err = h.orchestrator.ingest("octocat/hello-world").await.unwrap_err();

    assert_eq!(err.stage(), Some(IngestStage::Fetch));
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(h.graph.upsert_calls(), 0);
}

#[tokio::test]
async fn test_missing_working_tree_is_extraction_failure() {
    struct NowhereFetcher;

    #[async_trait::async_trait]
    impl RepoFetcher for NowhereFetcher {
        async fn fetch(&self, _repo_url: &str) -> Result<PathBuf> {
            Ok(PathBuf::from("/nonexistent/impact-ingest/tree"))
        }
    }

    let h = harness_with(Arc::new(NowhereFetcher), Arc::new(HashEmbedder::default()), IngestSettings::default());
    let err = h.orchestrator.ingest("octocat/hello-world").await.unwrap_err();

    assert!(matches!(err, IngestError::Extraction(ExtractionError::RootNotFound(_))));
}

#[tokio::test]
async fn test_embedding_failure_aborts_without_vector_writes() {
    let repo = two_file_repo();
    let h = harness_with(Arc::new(LocalPathFetcher), Arc::new(BrokenEmbedder), IngestSettings::default());

    let err = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap_err();

    assert!(matches!(err, IngestError::Embedding(EmbeddingError::GenerationFailed(_))));
    assert_eq!(err.stage(), Some(IngestStage::Embed));
    assert_eq!(h.vectors.upsert_calls(), 0);
    assert_eq!(h.graph.upsert_calls(), 0);
}

#[tokio::test]
async fn test_wrong_vector_dimension_is_rejected() {
    let repo = two_file_repo();
    let h = harness_with(Arc::new(LocalPathFetcher), Arc::new(LyingEmbedder), IngestSettings::default());

    let err = h.orchestrator.ingest(&url_of(repo.path())).await.unwrap_err();

    assert!(matches!(
        err,
        IngestError::Embedding(EmbeddingError::DimensionMismatch { expected: 64, actual: 8 })
    ));
    assert_eq!(h.vectors.upsert_calls(), 0);
}

#[tokio::test]
async fn test_transient_vector_failure_is_retried() {
    let repo = two_file_repo();
    let vectors = Arc::new(FlakyVectorIndex::new(2));
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(LocalPathFetcher),
        Arc::new(FileExtractor::new(&ExtractionConfig::default()).unwrap()),
        Arc::new(HashEmbedder::default()),
        vectors.clone(),
        Arc::new(InMemoryGraphStore::new()),
        IngestSettings::default(),
    )
    .with_retry_policy(fast_retry());

    let response = orchestrator.ingest(&url_of(repo.path())).await.unwrap();

    assert_eq!(response.chunk_count, 2);
    assert_eq!(vectors.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(vectors.point_count(COLLECTION).await.unwrap(), 2);
}

#[tokio::test]
async fn test_persistent_vector_failure_reports_vector_stage() {
    let repo = two_file_repo();
    let graph = Arc::new(InMemoryGraphStore::new());
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(LocalPathFetcher),
        Arc::new(FileExtractor::new(&ExtractionConfig::default()).unwrap()),
        Arc::new(HashEmbedder::default()),
        Arc::new(FlakyVectorIndex::new(usize::MAX)),
        graph.clone(),
        IngestSettings::default(),
    )
    .with_retry_policy(fast_retry());

    let err = orchestrator.ingest(&url_of(repo.path())).await.unwrap_err();

    assert_eq!(err.stage(), Some(IngestStage::VectorWrite));
    // Graph writes already happened and stay in place
    assert_eq!(graph.node_count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_graph_failure_stops_before_vector_write() {
    let repo = two_file_repo();
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let orchestrator = IngestionOrchestrator::new(
        Arc::new(LocalPathFetcher),
        Arc::new(FileExtractor::new(&ExtractionConfig::default()).unwrap()),
        Arc::new(HashEmbedder::default()),
        vectors.clone(),
        Arc::new(DownGraphStore),
        IngestSettings::default(),
    )
    .with_retry_policy(fast_retry());

    let err = orchestrator.ingest(&url_of(repo.path())).await.unwrap_err();

    assert!(matches!(err, IngestError::StoreWrite(StoreWriteError::Graph(_))));
    assert_eq!(err.stage(), Some(IngestStage::GraphWrite));
    assert_eq!(vectors.upsert_calls(), 0);
}

// ---------------------------------------------------------------------------
// Concurrency and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancelled_before_start() {
    let repo = two_file_repo();
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .orchestrator
        .ingest_with(&url_of(repo.path()), &cancel, &|_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled { stage: IngestStage::Fetch }));
    assert_eq!(h.graph.upsert_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_during_embedding_leaves_vectors_untouched() {
    let repo = two_file_repo();
    let cancel = CancellationToken::new();
    let embedder = Arc::new(CancellingEmbedder {
        cancel: cancel.clone(),
        inner: HashEmbedder::default(),
    });
    let h = harness_with(Arc::new(LocalPathFetcher), embedder, IngestSettings::default());

    let err = h
        .orchestrator
        .ingest_with(&url_of(repo.path()), &cancel, &|_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled { stage: IngestStage::Embed }));
    assert_eq!(h.vectors.upsert_calls(), 0);
}

#[tokio::test]
async fn test_same_repository_fetches_are_serialized() {
    let repo = two_file_repo();
    let fetcher = Arc::new(OverlapFetcher::default());
    let h = Arc::new(harness_with(fetcher.clone(), Arc::new(HashEmbedder::default()), IngestSettings::default()));
    let url = url_of(repo.path());

    let runs: Vec<_> = (0..3)
        .map(|_| {
            let h = h.clone();
            let url = url.clone();
            tokio::spawn(async move { h.orchestrator.ingest(&url).await })
        })
        .collect();
    for run in runs {
        assert_eq!(run.await.unwrap().unwrap().chunk_count, 2);
    }

    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.vectors.point_count(COLLECTION).await.unwrap(), 2);
}

#[tokio::test]
async fn test_different_repositories_fetch_in_parallel() {
    let repo_a = two_file_repo();
    let repo_b = two_file_repo();
    let fetcher = Arc::new(OverlapFetcher::default());
    let h = harness_with(fetcher.clone(), Arc::new(HashEmbedder::default()), IngestSettings::default());

    let url_a = url_of(repo_a.path());
    let url_b = url_of(repo_b.path());
    let (a, b) = tokio::join!(h.orchestrator.ingest(&url_a), h.orchestrator.ingest(&url_b));
    a.unwrap();
    b.unwrap();

    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
}
