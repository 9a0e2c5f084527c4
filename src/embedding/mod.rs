mod hash_embedder;

#[cfg(feature = "fastembed-provider")]
mod fastembed_manager;

pub use hash_embedder::{DEFAULT_DIMENSION, HashEmbedder};

#[cfg(feature = "fastembed-provider")]
pub use fastembed_manager::FastEmbedManager;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use anyhow::Result;
use std::sync::Arc;

/// Trait for embedding generation
///
/// Implementations must be deterministic for identical input and always return
/// vectors of [`EmbeddingProvider::dimension`] components.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Provider returned no vector"))
    }
}

/// Build the provider named in the configuration
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
        #[cfg(feature = "fastembed-provider")]
        "fastembed" => {
            let manager = FastEmbedManager::from_model_name(&config.model_name)
                .map_err(|e| EmbeddingError::InitializationFailed(format!("{:#}", e)))?;
            if manager.dimension() != config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: config.dimension,
                    actual: manager.dimension(),
                });
            }
            Ok(Arc::new(manager))
        }
        other => Err(EmbeddingError::InitializationFailed(format!(
            "unknown embedding provider '{}'",
            other
        ))),
    }
}
