mod batch;
/// Embedding & dense indexing
///
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (bge-small-zh-v1.5, 512-dim)
/// - HNSW index serving as the dense retrieval backend
/// - Batch processing to build the index from the corpus
mod provider;
mod vector_index;

pub use batch::{BatchProcessor, BatchResult};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{HnswParams, HnswVectorIndex, VectorIndexError};
