mod memory;
pub mod qdrant_client;

pub use memory::InMemoryVectorIndex;
pub use self::qdrant_client::QdrantVectorIndex;

use crate::error::ValidationError;
use crate::identity::is_chunk_id;
use crate::types::{DistanceMetric, EmbeddedChunk};
use anyhow::Result;

/// Trait for vector index operations
///
/// Points are keyed by chunk id, so every write is an idempotent upsert.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist; an existing collection is
    /// left untouched whatever its dimension or metric
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<()>;

    /// Write each chunk as a point keyed by its id, overwriting existing points
    ///
    /// An empty batch returns `Ok(0)` without touching the backend.
    async fn upsert_chunks(&self, collection: &str, batch: &[EmbeddedChunk]) -> Result<usize>;

    /// Number of points currently stored in the collection
    async fn point_count(&self, collection: &str) -> Result<u64>;
}

/// Numeric point id for a chunk id
///
/// Chunk ids are 16 hex characters, i.e. exactly 64 bits, so the mapping is
/// lossless and stable.
pub fn point_id(chunk_id: &str) -> Result<u64, ValidationError> {
    if !is_chunk_id(chunk_id) {
        return Err(ValidationError::InvalidChunkId(chunk_id.to_string()));
    }
    u64::from_str_radix(chunk_id, 16).map_err(|_| ValidationError::InvalidChunkId(chunk_id.to_string()))
}

/// Payload stored next to each vector
pub fn chunk_payload(chunk: &EmbeddedChunk) -> serde_json::Value {
    let chunk = &chunk.chunk;
    serde_json::json!({
        "chunk_id": chunk.id,
        "path": chunk.path,
        "language": chunk.language,
        "symbol": chunk.symbol,
        "kind": chunk.kind.as_str(),
        "summary": chunk.summary.clone().unwrap_or_default(),
    })
}
