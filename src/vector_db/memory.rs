use super::{VectorIndex, point_id};
use crate::types::{DistanceMetric, EmbeddedChunk};
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
struct Collection {
    dimension: usize,
    distance: DistanceMetric,
    points: HashMap<u64, EmbeddedChunk>,
}

/// Process-local vector index
///
/// Behaves like the Qdrant backend (numeric point ids, dimension checks,
/// first-writer-wins collections) and counts the calls that would have been
/// network requests.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: Mutex<HashMap<String, Collection>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty upserts issued so far
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Stored point for a chunk id
    pub fn get(&self, collection: &str, chunk_id: &str) -> Option<EmbeddedChunk> {
        let id = point_id(chunk_id).ok()?;
        let collections = self.collections.lock().ok()?;
        collections.get(collection)?.points.get(&id).cloned()
    }

    /// Chunk ids stored in a collection, sorted
    pub fn chunk_ids(&self, collection: &str) -> Vec<String> {
        let Ok(collections) = self.collections.lock() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = collections
            .get(collection)
            .map(|c| c.points.values().map(|p| p.chunk.id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Dimension and metric a collection was created with
    pub fn collection_params(&self, collection: &str) -> Option<(usize, DistanceMetric)> {
        let collections = self.collections.lock().ok()?;
        collections
            .get(collection)
            .map(|c| (c.dimension, c.distance))
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<()> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|e| anyhow::anyhow!("Collection map lock poisoned: {}", e))?;

        collections.entry(name.to_string()).or_insert_with(|| {
            tracing::info!("Creating in-memory collection '{}' (dimension {})", name, dimension);
            Collection {
                dimension,
                distance,
                points: HashMap::new(),
            }
        });
        Ok(())
    }

    async fn upsert_chunks(&self, collection: &str, batch: &[EmbeddedChunk]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self
            .collections
            .lock()
            .map_err(|e| anyhow::anyhow!("Collection map lock poisoned: {}", e))?;
        let Some(target) = collections.get_mut(collection) else {
            bail!("Collection '{}' does not exist", collection);
        };

        // Validate the whole batch before writing any of it
        let mut keyed = Vec::with_capacity(batch.len());
        for embedded in batch {
            if embedded.vector.len() != target.dimension {
                bail!(
                    "Vector dimension error: expected dim: {}, got {}",
                    target.dimension,
                    embedded.vector.len()
                );
            }
            keyed.push((point_id(&embedded.chunk.id)?, embedded.clone()));
        }

        target.points.extend(keyed);
        Ok(batch.len())
    }

    async fn point_count(&self, collection: &str) -> Result<u64> {
        let collections = self
            .collections
            .lock()
            .map_err(|e| anyhow::anyhow!("Collection map lock poisoned: {}", e))?;
        Ok(collections
            .get(collection)
            .map(|c| c.points.len() as u64)
            .unwrap_or(0))
    }
}
