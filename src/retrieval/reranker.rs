//! Cross-encoder reranking using FastEmbed

use crate::retrieval::{BackendError, RetrievalHit, SourceTag};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<RerankError> for BackendError {
    fn from(err: RerankError) -> Self {
        BackendError::unavailable("reranker", err)
    }
}

/// Pairwise (query, document) relevance scorer
#[async_trait]
pub trait PairwiseScorer: Send + Sync {
    /// Score every document against the query, one score per document in input order
    async fn score_batch(&self, query: &str, documents: &[String])
        -> Result<Vec<f32>, BackendError>;

    async fn score(&self, query: &str, document: &str) -> Result<f32, BackendError> {
        let scores = self.score_batch(query, &[document.to_string()]).await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::unavailable(self.name(), "scorer returned no score"))
    }

    fn name(&self) -> &str {
        "reranker"
    }
}

/// FastEmbed cross-encoder, loaded on first use.
///
/// Model download and initialization happen inside the first scoring call;
/// a failed load is reported as an unavailable backend and retried on the
/// next call.
pub struct FastEmbedScorer {
    model_name: String,
    model: OnceCell<Arc<TextRerank>>,
}

impl FastEmbedScorer {
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        // Validate the name up front so configuration errors surface early
        Self::resolve_model(model_name)?;
        Ok(Self {
            model_name: model_name.to_string(),
            model: OnceCell::new(),
        })
    }

    pub fn with_default_model() -> Result<Self, RerankError> {
        Self::new("bge-reranker-base")
    }

    fn resolve_model(model_name: &str) -> Result<RerankerModel, RerankError> {
        match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
            _ => Err(RerankError::InitializationError(format!(
                "Unsupported reranker model: {}. Supported: bge-reranker-base",
                model_name
            ))),
        }
    }

    async fn model(&self) -> Result<Arc<TextRerank>, RerankError> {
        self.model
            .get_or_try_init(|| async {
                let model = Self::resolve_model(&self.model_name)?;
                tracing::info!("Loading reranker model: {}", self.model_name);

                let loaded = tokio::task::spawn_blocking(move || {
                    let init_options = RerankInitOptions::new(model).with_show_download_progress(true);
                    TextRerank::try_new(init_options)
                        .map(Arc::new)
                        .map_err(|e| RerankError::InitializationError(e.to_string()))
                })
                .await
                .map_err(|e| RerankError::InitializationError(e.to_string()))??;

                Ok::<_, RerankError>(loaded)
            })
            .await
            .cloned()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl PairwiseScorer for FastEmbedScorer {
    async fn score_batch(
        &self,
        query: &str,
        documents: &[String],
    ) -> Result<Vec<f32>, BackendError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        if query.is_empty() {
            return Err(RerankError::InvalidInput("Query cannot be empty".to_string()).into());
        }

        let model = self.model().await?;
        let query = query.to_string();
        let documents = documents.to_vec();
        let count = documents.len();

        let results = tokio::task::spawn_blocking(move || {
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), docs, false, None)
                .map_err(|e| RerankError::RerankingError(e.to_string()))
        })
        .await
        .map_err(|e| RerankError::RerankingError(e.to_string()))??;

        // FastEmbed returns results sorted by score; put them back in input order
        let mut scores = vec![f32::NEG_INFINITY; count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "fastembed-reranker"
    }
}

/// Reranked candidates plus the reason reranking was skipped, if it was
#[derive(Debug)]
pub struct RerankOutcome {
    pub hits: Vec<RetrievalHit>,
    pub degraded: Option<BackendError>,
}

/// Reorders fused candidates with a pairwise scorer and truncates them.
pub struct RerankerAdapter {
    scorer: Option<Arc<dyn PairwiseScorer>>,
    timeout: Duration,
}

impl RerankerAdapter {
    pub fn new(scorer: Arc<dyn PairwiseScorer>, timeout: Duration) -> Self {
        Self {
            scorer: Some(scorer),
            timeout,
        }
    }

    /// Adapter that always passes fusion order through
    pub fn disabled() -> Self {
        Self {
            scorer: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.scorer.is_some()
    }

    /// Rerank `candidates` and keep the best `final_depth`.
    ///
    /// Sorting is stable, so equal scores keep their fused order. If the
    /// scorer is missing, fails, times out, or returns the wrong number of
    /// scores, the fused order is kept with placeholder scores
    /// `1.0 - 0.1 * i` and the incoming source tag.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalHit>,
        final_depth: usize,
    ) -> RerankOutcome {
        if candidates.is_empty() || final_depth == 0 {
            return RerankOutcome {
                hits: Vec::new(),
                degraded: None,
            };
        }

        let scorer = match &self.scorer {
            Some(scorer) => scorer,
            None => {
                return RerankOutcome {
                    hits: passthrough(candidates, final_depth),
                    degraded: None,
                }
            }
        };

        let documents: Vec<String> = candidates.iter().map(|h| h.content().to_string()).collect();

        let scores = match tokio::time::timeout(self.timeout, scorer.score_batch(query, &documents))
            .await
        {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                let err = BackendError::unavailable(
                    scorer.name(),
                    format!("expected {} scores, got {}", candidates.len(), scores.len()),
                );
                return degraded(candidates, final_depth, err);
            }
            Ok(Err(err)) => return degraded(candidates, final_depth, err),
            Err(_) => {
                return degraded(
                    candidates,
                    final_depth,
                    BackendError::timeout(scorer.name(), self.timeout),
                )
            }
        };

        let mut scored: Vec<(RetrievalHit, f32)> = candidates.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(final_depth);

        let hits = scored
            .into_iter()
            .enumerate()
            .map(|(i, (hit, score))| {
                RetrievalHit::new(Arc::clone(hit.document()), score, i + 1, SourceTag::Reranked)
            })
            .collect();

        RerankOutcome {
            hits,
            degraded: None,
        }
    }
}

fn degraded(candidates: Vec<RetrievalHit>, final_depth: usize, err: BackendError) -> RerankOutcome {
    tracing::warn!(
        backend = err.backend(),
        error = %err,
        "Reranker unavailable, keeping fusion order"
    );
    RerankOutcome {
        hits: passthrough(candidates, final_depth),
        degraded: Some(err),
    }
}

/// Keep fusion order with synthetic decreasing scores
fn passthrough(candidates: Vec<RetrievalHit>, final_depth: usize) -> Vec<RetrievalHit> {
    candidates
        .into_iter()
        .take(final_depth)
        .enumerate()
        .map(|(i, hit)| {
            RetrievalHit::new(
                Arc::clone(hit.document()),
                1.0 - 0.1 * i as f32,
                i + 1,
                hit.source(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl PairwiseScorer for FixedScorer {
        async fn score_batch(
            &self,
            _query: &str,
            _documents: &[String],
        ) -> Result<Vec<f32>, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl PairwiseScorer for FailingScorer {
        async fn score_batch(
            &self,
            _query: &str,
            _documents: &[String],
        ) -> Result<Vec<f32>, BackendError> {
            Err(BackendError::unavailable("reranker", "model not loaded"))
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl PairwiseScorer for SlowScorer {
        async fn score_batch(
            &self,
            _query: &str,
            documents: &[String],
        ) -> Result<Vec<f32>, BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![0.0; documents.len()])
        }
    }

    fn fused(n: usize) -> Vec<RetrievalHit> {
        (0..n)
            .map(|i| {
                let doc = Arc::new(Document::new(format!("doc_{}", i), format!("text {}", i), i));
                RetrievalHit::new(doc, 0.5, i + 1, SourceTag::Fused)
            })
            .collect()
    }

    fn ids(hits: &[RetrievalHit]) -> Vec<&str> {
        hits.iter().map(|h| h.document_id()).collect()
    }

    #[tokio::test]
    async fn test_rerank_sorts_and_truncates() {
        let adapter = RerankerAdapter::new(
            Arc::new(FixedScorer(vec![0.1, 0.9, 0.5, 0.9])),
            Duration::from_secs(1),
        );
        let outcome = adapter.rerank("q", fused(4), 3).await;

        assert!(outcome.degraded.is_none());
        // Equal scores keep input order
        assert_eq!(ids(&outcome.hits), ["doc_1", "doc_3", "doc_2"]);
        assert!(outcome.hits.iter().all(|h| h.source() == SourceTag::Reranked));
        assert_eq!(outcome.hits[2].rank(), 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let adapter = RerankerAdapter::new(Arc::new(FailingScorer), Duration::from_secs(1));
        let outcome = adapter.rerank("q", Vec::new(), 3).await;
        assert!(outcome.hits.is_empty());
        assert!(outcome.degraded.is_none());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_passthrough() {
        let adapter = RerankerAdapter::new(Arc::new(FailingScorer), Duration::from_secs(1));
        let outcome = adapter.rerank("q", fused(3), 2).await;

        assert!(outcome.degraded.is_some());
        assert_eq!(ids(&outcome.hits), ["doc_0", "doc_1"]);
        assert!((outcome.hits[0].score() - 1.0).abs() < 1e-6);
        assert!((outcome.hits[1].score() - 0.9).abs() < 1e-6);
        assert!(outcome.hits.iter().all(|h| h.source() == SourceTag::Fused));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_passthrough() {
        let adapter = RerankerAdapter::new(Arc::new(SlowScorer), Duration::from_millis(20));
        let outcome = adapter.rerank("q", fused(2), 2).await;

        assert!(matches!(outcome.degraded, Some(BackendError::Timeout { .. })));
        assert_eq!(ids(&outcome.hits), ["doc_0", "doc_1"]);
    }

    #[tokio::test]
    async fn test_score_count_mismatch_falls_back() {
        let adapter =
            RerankerAdapter::new(Arc::new(FixedScorer(vec![0.3])), Duration::from_secs(1));
        let outcome = adapter.rerank("q", fused(3), 3).await;

        assert!(outcome.degraded.is_some());
        assert_eq!(ids(&outcome.hits), ["doc_0", "doc_1", "doc_2"]);
    }

    #[tokio::test]
    async fn test_disabled_adapter_is_passthrough() {
        let adapter = RerankerAdapter::disabled();
        let outcome = adapter.rerank("q", fused(3), 2).await;
        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.hits.len(), 2);
        assert_eq!(outcome.hits[0].source(), SourceTag::Fused);
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(FastEmbedScorer::new("no-such-model").is_err());
        assert!(FastEmbedScorer::with_default_model().is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires model download
    async fn test_fastembed_scorer() {
        let scorer = FastEmbedScorer::with_default_model().unwrap();
        let docs = vec![
            "莆仙话：食，释义：吃饭".to_string(),
            "莆仙话：行，释义：走路".to_string(),
        ];
        let scores = scorer.score_batch("吃怎么说", &docs).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
    }
}
