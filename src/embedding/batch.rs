/// Batch embedding of the corpus into a dense index
use super::{EmbeddingError, EmbeddingProvider, HnswParams, HnswVectorIndex};
use crate::corpus::Document;
use crate::error::{PuxianError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a dense index build
#[derive(Debug)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Embeds documents in batches and inserts them into an HNSW index.
///
/// A batch that fails to embed is logged, counted and skipped; those
/// documents remain reachable through lexical search only.
pub struct BatchProcessor {
    provider: Arc<dyn EmbeddingProvider>,
    params: HnswParams,
    batch_size: usize,
}

impl BatchProcessor {
    /// Create a new batch processor
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `params` - HNSW parameters for the index being built
    /// * `batch_size` - Number of documents to embed in one call
    pub fn new(provider: Arc<dyn EmbeddingProvider>, params: HnswParams, batch_size: usize) -> Self {
        Self {
            provider,
            params,
            batch_size: batch_size.max(1),
        }
    }

    /// Build a dense index over `documents`
    pub async fn build_index(
        &self,
        documents: &[Arc<Document>],
    ) -> Result<(HnswVectorIndex, BatchResult)> {
        let start = std::time::Instant::now();

        info!("Embedding {} documents for the dense index", documents.len());

        let mut index = HnswVectorIndex::new(self.provider.dimension(), documents.len(), self.params)
            .map_err(|e| PuxianError::Config(e.to_string()))?;

        let mut processed = 0;
        let mut failed = 0;

        for chunk in documents.chunks(self.batch_size) {
            match self.embed_chunk(chunk).await {
                Ok(embeddings) => {
                    for (doc, embedding) in chunk.iter().zip(embeddings.iter()) {
                        match index.insert(doc.id(), embedding) {
                            Ok(()) => processed += 1,
                            Err(e) => {
                                warn!(id = doc.id(), "Failed to index embedding: {}", e);
                                failed += 1;
                            }
                        }
                    }
                    debug!("Indexed chunk of {} documents", chunk.len());
                }
                Err(e) => {
                    warn!("Failed to embed chunk of {} documents: {}", chunk.len(), e);
                    failed += chunk.len();
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Dense index built: {} processed, {} failed, {}ms",
            processed, failed, duration_ms
        );

        Ok((
            index,
            BatchResult {
                processed,
                failed,
                duration_ms,
            },
        ))
    }

    async fn embed_chunk(&self, chunk: &[Arc<Document>]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts: Vec<String> = chunk.iter().map(|doc| doc.content().to_string()).collect();
        let provider = Arc::clone(&self.provider);
        let expected = texts.len();

        let embeddings = tokio::task::spawn_blocking(move || provider.embed_batch(&texts))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))??;

        if embeddings.len() != expected {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                expected,
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
