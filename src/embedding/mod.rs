pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Embedding response is missing the vector field")]
    MissingVector,
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Abstract embedding model interface.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a single text into a vector of [`EmbeddingModel::dimensions`] floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Return the embedding dimensions.
    fn dimensions(&self) -> usize;
}
