/// Centralized error types for impact-ingest using thiserror
///
/// Every failure of an ingestion run maps onto the stage that produced it, so callers
/// can report "fetch failed" vs "graph write failed" without string matching.
use crate::types::IngestStage;
use thiserror::Error;

/// Main error type for an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store write error: {0}")]
    StoreWrite(#[from] StoreWriteError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ingestion cancelled during {stage} stage")]
    Cancelled { stage: IngestStage },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while cloning or updating a working tree
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to clone '{url}': {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Failed to update '{url}': {reason}")]
    UpdateFailed { url: String, reason: String },

    #[error("Failed to prepare working tree directory: {0}")]
    WorkingTree(String),

    #[error("Timed out waiting for repository lock on '{0}'")]
    LockTimeout(String),

    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

/// Errors raised while walking a working tree
///
/// Per-file read failures are not errors: they are recorded as skipped files.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Working tree not found: {0}")]
    RootNotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to walk working tree: {0}")]
    WalkFailed(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors related to embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding provider: {0}")]
    InitializationFailed(String),

    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Provider returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding task panicked: {0}")]
    TaskPanicked(String),
}

/// Errors raised by the vector index or the graph store
#[derive(Error, Debug)]
pub enum StoreWriteError {
    #[error("Vector index write failed: {0}")]
    Vector(String),

    #[error("Graph store write failed: {0}")]
    Graph(String),

    #[error("Failed to prepare collection '{collection}': {reason}")]
    CollectionSetup { collection: String, reason: String },

    #[error("Failed to prepare graph schema: {0}")]
    SchemaSetup(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Empty {0}")]
    Empty(String),

    #[error("Invalid repository URL '{0}': use https://github.com/owner/repo")]
    InvalidRepoUrl(String),

    #[error("Private repositories are not supported; omit the token")]
    TokenNotSupported,

    #[error("Repository URL must not embed credentials: {0}")]
    CredentialsInUrl(String),

    #[error("Invalid chunk id '{0}': expected 16 hex characters")]
    InvalidChunkId(String),
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Other(format!("{:#}", err))
    }
}

impl IngestError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IngestError::Other(msg.into())
    }

    /// The pipeline stage this error belongs to, if any
    pub fn stage(&self) -> Option<IngestStage> {
        match self {
            IngestError::Fetch(_) => Some(IngestStage::Fetch),
            IngestError::Extraction(_) => Some(IngestStage::Extract),
            IngestError::Embedding(_) => Some(IngestStage::Embed),
            IngestError::StoreWrite(StoreWriteError::Graph(_))
            | IngestError::StoreWrite(StoreWriteError::SchemaSetup(_)) => {
                Some(IngestStage::GraphWrite)
            }
            IngestError::StoreWrite(StoreWriteError::Vector(_))
            | IngestError::StoreWrite(StoreWriteError::CollectionSetup { .. }) => {
                Some(IngestStage::VectorWrite)
            }
            IngestError::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }

    /// Check if this is a user error (bad input) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IngestError::Validation(_) | IngestError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is safe to retry
    ///
    /// Store writes and fetches are idempotent, so re-running them converges.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::Fetch(_) | IngestError::StoreWrite(_) | IngestError::Io(_)
        )
    }
}
