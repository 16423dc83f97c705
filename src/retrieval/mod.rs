//! Hybrid retrieval & reranking
//!
//! Lexical (BM25) and dense search run per query variant, are merged with
//! Reciprocal Rank Fusion, and then re-scored by an optional cross-encoder.
//! Every degraded path is visible through the hits' [`SourceTag`].

mod dense;
mod fusion;
mod hit;
mod hybrid;
mod lexical;
mod reranker;

pub use dense::{BackendError, DenseIndexAdapter, VectorSearchBackend};
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError, FusionInput};
pub use hit::{RetrievalHit, RetrievedDocument, SourceTag};
pub use hybrid::{CorpusIndex, DenseIndexOptions, HybridResults, HybridSearcher};
pub use lexical::LexicalIndex;
pub use reranker::{
    FastEmbedScorer, PairwiseScorer, RerankError, RerankOutcome, RerankerAdapter,
};
