//! Dense Index Adapter over an opaque nearest-neighbour backend

use crate::error::PuxianError;
use crate::retrieval::{LexicalIndex, RetrievalHit, SourceTag};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of an external scoring or search collaborator.
///
/// Returned as a value so the fusion engine and the reranker adapter can
/// pick their degraded path explicitly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("{backend} timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    /// Turned off in configuration; not an outage
    #[error("{backend} disabled")]
    Disabled { backend: String },
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        BackendError::Unavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(backend: impl Into<String>, after: Duration) -> Self {
        BackendError::Timeout {
            backend: backend.into(),
            after,
        }
    }

    pub fn disabled(backend: impl Into<String>) -> Self {
        BackendError::Disabled {
            backend: backend.into(),
        }
    }

    /// Name of the backend that failed
    pub fn backend(&self) -> &str {
        match self {
            BackendError::Unavailable { backend, .. }
            | BackendError::Timeout { backend, .. }
            | BackendError::Disabled { backend } => backend,
        }
    }

    /// Whether the backend was switched off rather than failing
    pub fn is_disabled(&self) -> bool {
        matches!(self, BackendError::Disabled { .. })
    }
}

impl From<BackendError> for PuxianError {
    fn from(err: BackendError) -> Self {
        PuxianError::BackendUnavailable {
            backend: err.backend().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Nearest-neighbour vector index.
///
/// Returns `(document_id, distance)` pairs, nearest first.
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize)
        -> Result<Vec<(String, f32)>, BackendError>;

    /// Backend name used in logs and degraded-mode reports
    fn name(&self) -> &str {
        "vector-search"
    }
}

/// Turns a query embedding into dense-tagged hits against the corpus.
pub struct DenseIndexAdapter {
    backend: Arc<dyn VectorSearchBackend>,
    corpus: Arc<LexicalIndex>,
    timeout: Duration,
}

impl DenseIndexAdapter {
    /// `corpus` resolves the ids the backend returns into documents
    pub fn new(
        backend: Arc<dyn VectorSearchBackend>,
        corpus: Arc<LexicalIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            corpus,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Search with a pre-computed query embedding.
    ///
    /// Score is `1 - distance`; it is only guaranteed that higher means
    /// closer. Backend failures and timeouts are returned, never swallowed.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, BackendError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let neighbours =
            match tokio::time::timeout(self.timeout, self.backend.query(query_embedding, top_k))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(BackendError::timeout(self.backend.name(), self.timeout)),
            };

        let mut scored: Vec<(Arc<crate::corpus::Document>, f32)> = Vec::with_capacity(neighbours.len());
        for (id, distance) in neighbours {
            match self.corpus.document(&id) {
                Some(doc) if !scored.iter().any(|(seen, _)| seen.id() == doc.id()) => {
                    scored.push((Arc::clone(doc), 1.0 - distance));
                }
                Some(_) => {}
                None => tracing::debug!(id = %id, "Dense backend returned an id outside the corpus"),
            }
        }

        // Backends are not required to return neighbours sorted
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (doc, score))| RetrievalHit::new(doc, score, i + 1, SourceTag::Dense))
            .collect())
    }
}
