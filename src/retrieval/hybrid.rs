//! Hybrid search combining lexical and dense retrieval across query variants

use crate::corpus::DocumentStore;
use crate::embedding::{BatchProcessor, EmbeddingProvider, HnswParams};
use crate::error::{PuxianError, Result};
use crate::retrieval::{
    reciprocal_rank_fusion, BackendError, DenseIndexAdapter, FusionConfig, FusionInput,
    LexicalIndex, RetrievalHit,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// How to build the dense half of a [`CorpusIndex`]
#[derive(Clone)]
pub struct DenseIndexOptions {
    pub provider: Arc<dyn EmbeddingProvider>,
    pub params: HnswParams,
    pub batch_size: usize,
    /// Deadline for one nearest-neighbour query
    pub search_timeout: Duration,
}

/// The searchable corpus: a lexical index and, optionally, a dense index
/// over the same documents. Replaced as a whole on corpus reload.
pub struct CorpusIndex {
    lexical: Arc<LexicalIndex>,
    dense: Option<Arc<DenseIndexAdapter>>,
    /// Why a requested dense index is missing
    dense_outage: Option<BackendError>,
}

impl CorpusIndex {
    pub fn new(lexical: Arc<LexicalIndex>, dense: Option<DenseIndexAdapter>) -> Self {
        Self {
            lexical,
            dense: dense.map(Arc::new),
            dense_outage: None,
        }
    }

    /// Read every document from `store` and index it.
    ///
    /// Fails with `EmptyCorpus` when the store has no documents. A dense
    /// index that cannot be built leaves the corpus lexical-only.
    pub async fn build(store: &dyn DocumentStore, dense: Option<&DenseIndexOptions>) -> Result<Self> {
        let documents = store.list_all()?;
        let lexical = Arc::new(LexicalIndex::build(documents)?);
        tracing::info!(documents = lexical.len(), "Lexical index built");

        let dense = match dense {
            Some(options) => {
                let processor = BatchProcessor::new(
                    Arc::clone(&options.provider),
                    options.params,
                    options.batch_size,
                );
                match processor.build_index(lexical.documents()).await {
                    Ok((index, stats)) => {
                        if stats.failed > 0 {
                            tracing::warn!(
                                backend = "embedding",
                                failed = stats.failed,
                                "Some documents are missing from the dense index"
                            );
                        }
                        Ok(DenseIndexAdapter::new(
                            Arc::new(index),
                            Arc::clone(&lexical),
                            options.search_timeout,
                        ))
                    }
                    Err(e) => {
                        tracing::warn!(backend = "hnsw", error = %e, "Dense index build failed, corpus is lexical-only");
                        Err(BackendError::unavailable("hnsw", e))
                    }
                }
            }
            None => Err(BackendError::disabled("dense-index")),
        };

        Ok(match dense {
            Ok(adapter) => Self::new(lexical, Some(adapter)),
            Err(err) => Self {
                lexical,
                dense: None,
                dense_outage: (!err.is_disabled()).then_some(err),
            },
        })
    }

    pub fn lexical(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    pub fn has_dense(&self) -> bool {
        self.dense.is_some()
    }

    pub fn len(&self) -> usize {
        self.lexical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexical.is_empty()
    }
}

/// Fused candidates for one request
#[derive(Debug)]
pub struct HybridResults {
    pub hits: Vec<RetrievalHit>,
    /// Backends that failed for at least one variant
    pub degraded: Vec<BackendError>,
}

/// Per-variant retrieval output
struct VariantResult {
    index: usize,
    lexical: Vec<RetrievalHit>,
    dense: std::result::Result<Vec<RetrievalHit>, BackendError>,
}

/// Runs every query variant through lexical and dense search concurrently
/// and fuses the results.
pub struct HybridSearcher {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// Why a configured embedder is missing
    embedder_outage: Option<BackendError>,
    embed_timeout: Duration,
    fusion: FusionConfig,
}

impl HybridSearcher {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        embed_timeout: Duration,
        fusion: FusionConfig,
    ) -> Self {
        Self {
            embedder,
            embedder_outage: None,
            embed_timeout,
            fusion,
        }
    }

    /// Report `err` on every request instead of treating dense search as
    /// switched off. Used when the embedding model was configured but failed
    /// to load.
    pub fn with_embedder_outage(mut self, err: BackendError) -> Self {
        self.embedder_outage = Some(err);
        self
    }

    /// Search all `variants` and fuse to `candidate_depth` hits.
    ///
    /// One task per variant; tasks are aborted if this future is dropped.
    pub async fn search(
        &self,
        corpus: &CorpusIndex,
        variants: &[String],
        candidate_depth: usize,
    ) -> Result<HybridResults> {
        if variants.iter().all(|v| v.trim().is_empty()) {
            return Err(PuxianError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        // Missing dense retrieval is silent unless it was meant to be there
        let missing_dense = corpus
            .dense_outage
            .clone()
            .or_else(|| self.embedder_outage.clone())
            .unwrap_or_else(|| BackendError::disabled("dense-index"));

        let mut tasks = JoinSet::new();
        for (index, variant) in variants.iter().enumerate() {
            let lexical = Arc::clone(&corpus.lexical);
            let dense = corpus.dense.clone();
            let embedder = self.embedder.clone();
            let missing_dense = missing_dense.clone();
            let embed_timeout = self.embed_timeout;
            let variant = variant.clone();

            tasks.spawn(async move {
                let lexical_hits = lexical.search(&variant, candidate_depth);
                let dense_hits = match (dense, embedder) {
                    (Some(dense), Some(embedder)) => {
                        dense_search(dense, embedder, embed_timeout, &variant, candidate_depth)
                            .await
                    }
                    _ => Err(missing_dense),
                };

                tracing::debug!(
                    variant = %variant,
                    lexical = lexical_hits.len(),
                    dense = dense_hits.as_ref().map(Vec::len).unwrap_or(0),
                    "Variant searched"
                );

                VariantResult {
                    index,
                    lexical: lexical_hits,
                    dense: dense_hits,
                }
            });
        }

        let mut results = Vec::with_capacity(variants.len());
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| {
                PuxianError::Other(anyhow::anyhow!("Variant search task failed: {}", e))
            })?;
            results.push(result);
        }
        results.sort_by_key(|r| r.index);

        let mut lexical_lists = Vec::with_capacity(results.len());
        let mut dense_lists = Vec::with_capacity(results.len());
        let mut dense_errors = Vec::new();
        let mut dense_disabled = None;

        for result in results {
            lexical_lists.push(result.lexical);
            match result.dense {
                Ok(hits) => dense_lists.push(hits),
                Err(err) if err.is_disabled() => dense_disabled = Some(err),
                Err(err) => {
                    tracing::warn!(
                        backend = err.backend(),
                        error = %err,
                        variant = result.index,
                        "Dense search failed for query variant"
                    );
                    dense_errors.push(err);
                }
            }
        }

        // Dense is unusable only if no variant got dense results
        let dense = if dense_lists.is_empty() {
            match dense_errors.first().cloned().or(dense_disabled) {
                Some(err) => Err(err),
                None => Ok(dense_lists),
            }
        } else {
            Ok(dense_lists)
        };

        let hits = reciprocal_rank_fusion(
            FusionInput {
                lexical: lexical_lists,
                dense,
            },
            &self.fusion,
            candidate_depth,
        );

        dense_errors.dedup();

        Ok(HybridResults {
            hits,
            degraded: dense_errors,
        })
    }
}

async fn dense_search(
    dense: Arc<DenseIndexAdapter>,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
    variant: &str,
    top_k: usize,
) -> std::result::Result<Vec<RetrievalHit>, BackendError> {
    let text = variant.to_string();
    // Blocking tasks cannot be cancelled: on timeout or request cancellation
    // the embedding still runs to completion on the blocking pool and its
    // result is dropped. The pool bounds how many can pile up.
    let embedding = tokio::time::timeout(
        embed_timeout,
        tokio::task::spawn_blocking(move || embedder.embed(&text)),
    )
    .await
    .map_err(|_| BackendError::timeout("embedding", embed_timeout))?
    .map_err(|e| BackendError::unavailable("embedding", e))?
    .map_err(|e| BackendError::unavailable("embedding", e))?;

    dense.search(&embedding, top_k).await
}
