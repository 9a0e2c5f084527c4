use super::{VectorIndex, chunk_payload, point_id};
use crate::config::VectorDbConfig;
use crate::types::{DistanceMetric, EmbeddedChunk};
use anyhow::{Context, Result};
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder,
    VectorParams, VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use std::time::Duration;

/// Vector index backed by a Qdrant server (gRPC)
pub struct QdrantVectorIndex {
    client: Qdrant,
}

impl QdrantVectorIndex {
    /// Create a new Qdrant client with default local configuration
    pub fn new() -> Result<Self> {
        Self::from_config(&VectorDbConfig::default())
    }

    /// Create a client from configuration; no connection is made until first use
    pub fn from_config(config: &VectorDbConfig) -> Result<Self> {
        tracing::info!("Connecting to Qdrant at {}", config.qdrant_url);

        let client = Qdrant::from_url(&config.qdrant_url)
            .api_key(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create Qdrant client")?;

        Ok(Self { client })
    }

    /// Check if collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .context("Failed to list collections")?;

        Ok(collections.collections.iter().any(|c| c.name == name))
    }
}

fn qdrant_distance(distance: DistanceMetric) -> Distance {
    match distance {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Dot => Distance::Dot,
        DistanceMetric::Euclid => Distance::Euclid,
        DistanceMetric::Manhattan => Distance::Manhattan,
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: DistanceMetric,
    ) -> Result<()> {
        if self.collection_exists(name).await? {
            tracing::debug!("Collection '{}' already exists", name);
            return Ok(());
        }

        tracing::info!(
            "Creating collection '{}' with dimension {} ({:?})",
            name,
            dimension,
            distance
        );

        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(
                VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimension as u64,
                        distance: qdrant_distance(distance).into(),
                        ..Default::default()
                    })),
                },
            ))
            .await
            .context("Failed to create collection")?;

        Ok(())
    }

    async fn upsert_chunks(&self, collection: &str, batch: &[EmbeddedChunk]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        tracing::debug!("Upserting {} points into '{}'", count, collection);

        let points = batch
            .iter()
            .map(|embedded| {
                let id = point_id(&embedded.chunk.id)?;
                let payload = Payload::try_from(chunk_payload(embedded))
                    .context("Failed to build point payload")?;
                Ok(PointStruct::new(id, embedded.vector.clone(), payload))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .context("Failed to upsert points")?;

        Ok(count)
    }

    async fn point_count(&self, collection: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .context("Failed to count points")?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}
