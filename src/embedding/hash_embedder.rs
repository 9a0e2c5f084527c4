use super::EmbeddingProvider;
use anyhow::Result;
use sha2::{Digest, Sha256};

/// Default vector dimension of the hash embedder
pub const DEFAULT_DIMENSION: usize = 64;

/// Deterministic stand-in embedding provider
///
/// The SHA-256 digest of the text is repeated to fill the vector and divided by its
/// largest component, so every value lies in `[0, 1]`. Identical text always maps
/// to the identical vector; the vectors carry no semantic meaning.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let raw: Vec<f32> = digest
            .iter()
            .cycle()
            .take(self.dimension)
            .map(|&b| b as f32)
            .collect();

        let max = raw.iter().copied().fold(0.0f32, f32::max);
        let scale = if max > 0.0 { max } else { 1.0 };
        raw.into_iter().map(|v| v / scale).collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating hash embeddings for {} texts", texts.len());
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "sha256-hash"
    }
}
