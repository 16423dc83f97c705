/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Calls are synchronous and CPU-bound; async callers run them on the
/// blocking pool.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one per input in order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Supported models as (config name, model, dimension, approximate download size in MB)
const SUPPORTED_MODELS: &[(&str, EmbeddingModel, usize, usize)] = &[
    ("bge-small-zh-v1.5", EmbeddingModel::BGESmallZHV15, 512, 95),
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384, 90),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384, 130),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768, 440),
];

/// FastEmbed provider for local embedding generation
///
/// Defaults to bge-small-zh-v1.5 (512 dimensions), which handles Chinese
/// dialect glossaries far better than the English-only models.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// Models are downloaded on first use to the FastEmbed cache directory.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = Self::resolve_model(model_name)?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (bge-small-zh-v1.5)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("bge-small-zh-v1.5")
    }

    /// Map a configured model name to the FastEmbed model, its dimension and size
    pub fn resolve_model(model_name: &str) -> Result<(EmbeddingModel, usize, usize), EmbeddingError> {
        SUPPORTED_MODELS
            .iter()
            .find(|(name, ..)| name.eq_ignore_ascii_case(model_name))
            .map(|(_, model, dimension, size)| (model.clone(), *dimension, *size))
            .ok_or_else(|| {
                let supported: Vec<&str> = SUPPORTED_MODELS.iter().map(|(name, ..)| *name).collect();
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    supported.join(", ")
                ))
            })
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Output must line up with input, so empty texts are an error rather than skipped
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at position {}",
                position
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model() {
        let (_, dimension, _) = FastEmbedProvider::resolve_model("bge-small-zh-v1.5").unwrap();
        assert_eq!(dimension, 512);

        let (_, dimension, _) = FastEmbedProvider::resolve_model("ALL-MINILM-L6-V2").unwrap();
        assert_eq!(dimension, 384);

        let err = FastEmbedProvider::resolve_model("gpt-embed").unwrap_err();
        assert!(err.to_string().contains("bge-small-zh-v1.5"));
    }

    #[test]
    #[ignore] // Requires model download (~95MB) - run with: cargo test -- --ignored
    fn test_provider_creation() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert_eq!(provider.dimension(), 512);
        assert_eq!(provider.model_name(), "bge-small-zh-v1.5");
    }

    #[test]
    #[ignore] // Requires model download (~95MB) - run with: cargo test -- --ignored
    fn test_batch_embedding_keeps_order() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "莆仙话：食，释义：吃饭".to_string(),
            "莆仙话：行，释义：走路".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);

        let single = provider.embed(&texts[1]).unwrap();
        let diff: f32 = single
            .iter()
            .zip(&embeddings[1])
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff < 1e-3);
    }

    #[test]
    #[ignore] // Requires model download (~95MB) - run with: cargo test -- --ignored
    fn test_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let eat = provider.embed("吃饭").unwrap();
        let dine = provider.embed("用餐").unwrap();
        let code = provider.embed("编程语言").unwrap();

        assert!(cosine_similarity(&eat, &dine) > cosine_similarity(&eat, &code));
    }

    #[test]
    #[ignore] // Requires model download (~95MB) - run with: cargo test -- --ignored
    fn test_empty_text() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert!(provider.embed("   ").is_err());
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }
}
