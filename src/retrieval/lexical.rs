//! In-process BM25 lexical index
//!
//! The index owns the corpus: every other component refers to documents
//! through the `Arc<Document>` handles it hands out.

use crate::corpus::Document;
use crate::error::{PuxianError, Result};
use crate::retrieval::{RetrievalHit, SourceTag};
use crate::text::tokenize;
use ahash::AHashMap;
use std::sync::Arc;

/// BM25 term-frequency saturation
const K1: f32 = 1.5;
/// BM25 length normalization
const B: f32 = 0.75;

/// Per-document term statistics
#[derive(Debug)]
struct DocStats {
    term_freqs: AHashMap<String, u32>,
    length: usize,
}

/// Lexical index with BM25 ranking
#[derive(Debug)]
pub struct LexicalIndex {
    documents: Vec<Arc<Document>>,
    by_id: AHashMap<String, usize>,
    stats: Vec<DocStats>,
    idf: AHashMap<String, f32>,
    avg_length: f32,
}

impl LexicalIndex {
    /// Build the index from the full corpus.
    ///
    /// Fails with [`PuxianError::EmptyCorpus`] when there is nothing to index
    /// and with [`PuxianError::DuplicateDocumentId`] when ids are not unique,
    /// since fusion and the dense adapter both resolve documents by id.
    pub fn build(documents: Vec<Document>) -> Result<Self> {
        if documents.is_empty() {
            return Err(PuxianError::EmptyCorpus);
        }

        let documents: Vec<Arc<Document>> = documents.into_iter().map(Arc::new).collect();

        let mut stats = Vec::with_capacity(documents.len());
        let mut doc_freqs: AHashMap<String, u32> = AHashMap::new();
        let mut by_id = AHashMap::with_capacity(documents.len());
        let mut total_length = 0usize;

        for (position, doc) in documents.iter().enumerate() {
            let tokens = doc.tokens();
            let mut term_freqs: AHashMap<String, u32> = AHashMap::new();
            for token in tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            total_length += tokens.len();
            if by_id.insert(doc.id().to_string(), position).is_some() {
                return Err(PuxianError::DuplicateDocumentId {
                    id: doc.id().to_string(),
                });
            }
            stats.push(DocStats {
                term_freqs,
                length: tokens.len(),
            });
        }

        let n = documents.len() as f32;
        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f32;
                (term, (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        let avg_length = (total_length as f32 / n).max(1.0);

        tracing::info!(
            "Lexical index built: {} documents, avg length {:.1} terms",
            documents.len(),
            avg_length
        );

        Ok(Self {
            documents,
            by_id,
            stats,
            idf,
            avg_length,
        })
    }

    /// Rank documents against a query.
    ///
    /// Hits come back by descending score with ties kept in corpus order.
    /// Documents scoring zero or less are never returned.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalHit> {
        if top_k == 0 {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .stats
            .iter()
            .enumerate()
            .map(|(position, stats)| (position, self.score(&query_terms, stats)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Stable sort keeps corpus order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (position, score))| {
                RetrievalHit::new(
                    Arc::clone(&self.documents[position]),
                    score,
                    i + 1,
                    SourceTag::Lexical,
                )
            })
            .collect()
    }

    fn score(&self, query_terms: &[String], stats: &DocStats) -> f32 {
        let length_norm = 1.0 - B + B * (stats.length as f32 / self.avg_length);

        query_terms
            .iter()
            .filter_map(|term| {
                let tf = *stats.term_freqs.get(term)? as f32;
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                Some(idf * tf * (K1 + 1.0) / (tf + K1 * length_norm))
            })
            .sum()
    }

    /// Look up a document by id
    pub fn document(&self, id: &str) -> Option<&Arc<Document>> {
        self.by_id.get(id).map(|&position| &self.documents[position])
    }

    /// All documents in corpus order
    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Document::new(format!("doc_{}", i), *c, i))
            .collect()
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let result = LexicalIndex::build(Vec::new());
        assert!(matches!(result, Err(PuxianError::EmptyCorpus)));
    }

    #[test]
    fn test_single_document_still_matches() {
        let index = LexicalIndex::build(corpus(&["莆仙话：食，释义：吃饭"])).unwrap();
        let hits = index.search("吃怎么说", 10);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank(), 1);
        assert_eq!(hits[0].source(), SourceTag::Lexical);
        assert!(hits[0].score() > 0.0);
    }

    #[test]
    fn test_non_matching_documents_excluded() {
        let index = LexicalIndex::build(corpus(&[
            "莆仙话：食，释义：吃饭",
            "莆仙话：行，释义：走路",
            "the quick brown fox",
        ]))
        .unwrap();

        // Three slots requested, only one document shares a term
        let hits = index.search("吃", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id(), "doc_0");

        assert!(index.search("python", 3).is_empty());
        assert!(index.search("，。", 3).is_empty());
    }

    #[test]
    fn test_ranking_prefers_more_matches() {
        let index = LexicalIndex::build(corpus(&[
            "莆仙话：行，释义：走路",
            "莆仙话：食，释义：吃饭",
            "吃饭 吃饭 吃饭",
        ]))
        .unwrap();

        let hits = index.search("吃饭", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id(), "doc_2");
        assert_eq!(hits[1].document_id(), "doc_1");
        assert!(hits[0].score() >= hits[1].score());
        assert_eq!(hits[1].rank(), 2);
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let index = LexicalIndex::build(corpus(&["apple pie", "other", "apple pie"])).unwrap();
        let hits = index.search("apple", 10);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score(), hits[1].score());
        assert_eq!(hits[0].document_id(), "doc_0");
        assert_eq!(hits[1].document_id(), "doc_2");
    }

    #[test]
    fn test_top_k_truncates() {
        let index = LexicalIndex::build(corpus(&["a x", "a y", "a z"])).unwrap();
        assert_eq!(index.search("a", 2).len(), 2);
        assert!(index.search("a", 0).is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = LexicalIndex::build(vec![
            Document::new("w1", "食 吃饭", 0),
            Document::new("w1", "食 食物", 1),
        ]);

        match result {
            Err(PuxianError::DuplicateDocumentId { id }) => assert_eq!(id, "w1"),
            other => panic!("expected duplicate id error, got {:?}", other.map(|i| i.len())),
        }
    }

    #[test]
    fn test_document_lookup() {
        let index = LexicalIndex::build(corpus(&["one", "two"])).unwrap();
        assert_eq!(index.document("doc_1").unwrap().content(), "two");
        assert!(index.document("doc_9").is_none());
        assert_eq!(index.len(), 2);
    }
}
