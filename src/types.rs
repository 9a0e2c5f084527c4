use crate::error::ValidationError;
use crate::identity::derive_chunk_id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of a chunk
///
/// Extraction is file-granular today; the other variants exist so finer-grained
/// extractors can be plugged in without string matching downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    File,
    Module,
    Class,
    Function,
    Method,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::File => "file",
            ChunkKind::Module => "module",
            ChunkKind::Class => "class",
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw chunk record produced by an extractor, before identity is assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCandidate {
    /// Repository-relative path with `/` separators
    pub path: String,
    /// Canonical language tag (e.g. "python"), if detected
    pub language: Option<String>,
    /// Logical name; the file stem for file-level chunks
    pub symbol: String,
    pub kind: ChunkKind,
    /// Raw text, already truncated by the extractor
    pub content: String,
    pub summary: Option<String>,
}

/// A content-addressed unit of ingested source material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived from `(path, symbol, content)`; see [`crate::identity::derive_chunk_id`]
    pub id: String,
    pub path: String,
    pub language: Option<String>,
    pub symbol: String,
    pub kind: ChunkKind,
    pub content: String,
    pub summary: Option<String>,
}

impl Chunk {
    /// Assign a content-addressed id to an extracted candidate
    pub fn from_candidate(candidate: ChunkCandidate) -> Result<Self, ValidationError> {
        if candidate.path.is_empty() {
            return Err(ValidationError::Empty("chunk path".to_string()));
        }

        let id = derive_chunk_id(&candidate.path, &candidate.symbol, &candidate.content);
        Ok(Self {
            id,
            path: candidate.path,
            language: candidate.language,
            symbol: candidate.symbol,
            kind: candidate.kind,
            content: candidate.content,
            summary: candidate.summary,
        })
    }
}

/// A chunk paired with its embedding, ready for the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Distance metric used when the vector collection is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

/// Stages of a single ingestion run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Fetch,
    Extract,
    Embed,
    GraphWrite,
    VectorWrite,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Fetch => "fetch",
            IngestStage::Extract => "extract",
            IngestStage::Embed => "embed",
            IngestStage::GraphWrite => "graph write",
            IngestStage::VectorWrite => "vector write",
        };
        f.write_str(name)
    }
}

/// Request to ingest a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Public repository URL (or `owner/repo` shorthand)
    pub repo_url: String,
    /// Access token; any value is rejected because only public repositories are supported
    #[serde(default)]
    pub token: Option<String>,
}

impl IngestRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            token: None,
        }
    }

    /// Validate the request and return the normalized repository URL
    pub fn validate(&self) -> Result<String, ValidationError> {
        if self.token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return Err(ValidationError::TokenNotSupported);
        }
        crate::fetch::normalize_repo_url(&self.repo_url)
    }
}

/// Result of a successful ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub repo_url: String,
    /// Number of chunks written to both stores
    pub chunk_count: usize,
    /// Ids of every chunk written, in extraction order
    pub chunk_ids: Vec<String>,
    /// Files the extractor could not read (non-fatal)
    pub files_skipped: usize,
    /// Number of calls made to the embedding provider
    pub embedding_batches: usize,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Non-fatal problems encountered along the way
    #[serde(default)]
    pub warnings: Vec<String>,
}
