//! Reciprocal Rank Fusion for combining lexical and dense results
//!
//! Each query variant yields one lexical and one dense list. Within a signal
//! a document keeps its best per-variant contribution `1/(k + rank)`; the
//! lexical best and dense best are then summed. Rewording the same query
//! several times therefore never inflates a score.

use crate::corpus::Document;
use crate::retrieval::{BackendError, RetrievalHit, SourceTag};
use ahash::AHashMap;
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be finite and non-negative")]
    InvalidK(f64),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// RRF damping constant (60 by default)
    pub rrf_k: f64,
}

impl FusionConfig {
    pub fn new(rrf_k: f64) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidK(rrf_k));
        }
        Ok(Self { rrf_k })
    }

    fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.rrf_k + rank as f64)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { rrf_k: 60.0 }
    }
}

/// Ranked lists collected for one request
#[derive(Debug)]
pub struct FusionInput {
    /// One lexical list per query variant
    pub lexical: Vec<Vec<RetrievalHit>>,
    /// One dense list per query variant, or why dense retrieval is unavailable
    pub dense: Result<Vec<Vec<RetrievalHit>>, BackendError>,
}

/// Best contribution and best rank of one document within one signal
#[derive(Debug, Default, Clone, Copy)]
struct SignalBest {
    contribution: f64,
    rank: Option<usize>,
}

impl SignalBest {
    fn offer(&mut self, contribution: f64, rank: usize) {
        if contribution > self.contribution {
            self.contribution = contribution;
        }
        self.rank = Some(self.rank.map_or(rank, |r| r.min(rank)));
    }
}

/// Fusion accumulator entry, alive only during one fusion call
struct Accumulated {
    document: Arc<Document>,
    lexical: SignalBest,
    dense: SignalBest,
}

impl Accumulated {
    fn score(&self) -> f64 {
        self.lexical.contribution + self.dense.contribution
    }

    /// Earliest appearance: lexical before dense, then lowest rank
    fn first_seen(&self) -> (u8, usize) {
        match (self.lexical.rank, self.dense.rank) {
            (Some(rank), _) => (0, rank),
            (None, Some(rank)) => (1, rank),
            (None, None) => (2, usize::MAX),
        }
    }
}

/// Apply Reciprocal Rank Fusion.
///
/// Every document present in any input list appears exactly once in the
/// output. Output is sorted by fused score, ties broken by earliest
/// appearance and then corpus order, and truncated to `depth`. The result
/// does not depend on the order the lists were supplied in.
///
/// When dense retrieval failed or is disabled the output is the lexical-only
/// ranking and every hit is tagged [`SourceTag::Lexical`]; otherwise hits are
/// tagged [`SourceTag::Fused`].
pub fn reciprocal_rank_fusion(
    input: FusionInput,
    config: &FusionConfig,
    depth: usize,
) -> Vec<RetrievalHit> {
    let mut accumulator: AHashMap<String, Accumulated> = AHashMap::new();

    let FusionInput { lexical, dense } = input;

    let tag = match &dense {
        Ok(_) => SourceTag::Fused,
        Err(err) if err.is_disabled() => SourceTag::Lexical,
        Err(err) => {
            tracing::warn!(
                backend = err.backend(),
                error = %err,
                "Dense retrieval unavailable, fusing lexical results only"
            );
            SourceTag::Lexical
        }
    };

    for hit in lexical.iter().flatten() {
        let contribution = config.contribution(hit.rank());
        entry(&mut accumulator, hit).lexical.offer(contribution, hit.rank());
    }

    if let Ok(dense) = &dense {
        for hit in dense.iter().flatten() {
            let contribution = config.contribution(hit.rank());
            entry(&mut accumulator, hit).dense.offer(contribution, hit.rank());
        }
    }

    let mut fused: Vec<Accumulated> = accumulator.into_values().collect();
    fused.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.first_seen().cmp(&b.first_seen()))
            .then_with(|| a.document.ordinal().cmp(&b.document.ordinal()))
            .then_with(|| a.document.id().cmp(b.document.id()))
    });
    fused.truncate(depth);

    fused
        .into_iter()
        .enumerate()
        .map(|(i, acc)| {
            let score = acc.score() as f32;
            RetrievalHit::new(acc.document, score, i + 1, tag)
        })
        .collect()
}

fn entry<'a>(
    accumulator: &'a mut AHashMap<String, Accumulated>,
    hit: &RetrievalHit,
) -> &'a mut Accumulated {
    accumulator
        .entry(hit.document_id().to_string())
        .or_insert_with(|| Accumulated {
            document: Arc::clone(hit.document()),
            lexical: SignalBest::default(),
            dense: SignalBest::default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> Vec<Arc<Document>> {
        (0..n)
            .map(|i| Arc::new(Document::new(format!("doc_{}", i), format!("content {}", i), i)))
            .collect()
    }

    fn list(docs: &[Arc<Document>], order: &[usize], source: SourceTag) -> Vec<RetrievalHit> {
        order
            .iter()
            .enumerate()
            .map(|(i, &d)| RetrievalHit::new(Arc::clone(&docs[d]), 1.0, i + 1, source))
            .collect()
    }

    fn ids(hits: &[RetrievalHit]) -> Vec<&str> {
        hits.iter().map(|h| h.document_id()).collect()
    }

    #[test]
    fn test_rrf_basic() {
        let d = docs(4);
        let input = FusionInput {
            lexical: vec![list(&d, &[1, 0, 3], SourceTag::Lexical)],
            dense: Ok(vec![list(&d, &[0, 1, 2], SourceTag::Dense)]),
        };

        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 10);
        assert_eq!(fused.len(), 4);

        // doc_0 and doc_1 appear in both lists with ranks {1,2}; lexical rank 1 wins the tie
        assert_eq!(ids(&fused)[..2], ["doc_1", "doc_0"]);
        assert!((fused[0].score() - fused[1].score()).abs() < 1e-9);
        assert!(fused.iter().all(|h| h.source() == SourceTag::Fused));
        assert_eq!(fused[3].rank(), 4);
    }

    #[test]
    fn test_variant_max_not_sum() {
        let d = docs(2);
        let input = FusionInput {
            lexical: vec![
                list(&d, &[0], SourceTag::Lexical),
                list(&d, &[1, 0], SourceTag::Lexical),
                list(&d, &[0], SourceTag::Lexical),
            ],
            dense: Ok(Vec::new()),
        };

        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 10);
        assert_eq!(ids(&fused), ["doc_0", "doc_1"]);
        assert!((fused[0].score() - 1.0 / 61.0).abs() < 1e-7);
        assert!((fused[1].score() - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_degraded_dense_keeps_lexical_ranking() {
        let d = docs(3);
        let lexical = vec![list(&d, &[2, 0, 1], SourceTag::Lexical)];
        let input = FusionInput {
            lexical,
            dense: Err(BackendError::unavailable("hnsw", "down")),
        };

        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 10);
        assert_eq!(ids(&fused), ["doc_2", "doc_0", "doc_1"]);
        assert!(fused.iter().all(|h| h.source() == SourceTag::Lexical));
    }

    #[test]
    fn test_disabled_dense_is_lexical_only() {
        let d = docs(2);
        let input = FusionInput {
            lexical: vec![list(&d, &[1, 0], SourceTag::Lexical)],
            dense: Err(BackendError::disabled("dense-index")),
        };

        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 10);
        assert_eq!(ids(&fused), ["doc_1", "doc_0"]);
        assert!(fused.iter().all(|h| h.source() == SourceTag::Lexical));
    }

    #[test]
    fn test_truncates_to_depth() {
        let d = docs(5);
        let input = FusionInput {
            lexical: vec![list(&d, &[0, 1, 2, 3, 4], SourceTag::Lexical)],
            dense: Ok(Vec::new()),
        };
        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 2);
        assert_eq!(ids(&fused), ["doc_0", "doc_1"]);
    }

    #[test]
    fn test_dense_only_documents_follow_lexical_on_ties() {
        let d = docs(2);
        let input = FusionInput {
            lexical: vec![list(&d, &[1], SourceTag::Lexical)],
            dense: Ok(vec![list(&d, &[0], SourceTag::Dense)]),
        };
        let fused = reciprocal_rank_fusion(input, &FusionConfig::default(), 10);
        assert_eq!(ids(&fused), ["doc_1", "doc_0"]);
    }

    #[test]
    fn test_invalid_k() {
        assert!(FusionConfig::new(-1.0).is_err());
        assert!(FusionConfig::new(f64::NAN).is_err());
        assert!(FusionConfig::new(0.0).is_ok());
    }
}
