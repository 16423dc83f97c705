//! Integration Test: Hybrid Retrieval & Reranking
//!
//! Lexical index, dense adapter, fusion and reranker wired together over a
//! small Puxian vocabulary corpus.

use async_trait::async_trait;
use puxian::corpus::{Document, InMemoryDocumentStore};
use puxian::embedding::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, HnswParams};
use puxian::retrieval::{
    reciprocal_rank_fusion, BackendError, CorpusIndex, DenseIndexAdapter, DenseIndexOptions,
    FastEmbedScorer, FusionConfig, FusionInput, HybridSearcher, LexicalIndex, PairwiseScorer,
    RerankerAdapter, RetrievalHit, SourceTag, VectorSearchBackend,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const VOCABULARY: [&str; 6] = [
    "莆仙话：食，释义：吃饭",
    "莆仙话：行，释义：走路",
    "莆仙话：厝，释义：房子",
    "莆仙话：囝，释义：小孩",
    "莆仙话：䆀，释义：丑、不好看",
    "莆仙话：食糜，释义：喝粥",
];

fn corpus_documents() -> Vec<Document> {
    VOCABULARY
        .iter()
        .enumerate()
        .map(|(i, content)| Document::new(format!("doc_{}", i), *content, i))
        .collect()
}

fn lexical_index() -> Arc<LexicalIndex> {
    Arc::new(LexicalIndex::build(corpus_documents()).unwrap())
}

/// Embeds every text to the same vector; distances come from the backend
struct FlatEmbedder;

impl EmbeddingProvider for FlatEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.5, 0.5])
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.5, 0.5]).collect())
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "flat"
    }
}

struct ScriptedBackend(Vec<(&'static str, f32)>);

#[async_trait]
impl VectorSearchBackend for ScriptedBackend {
    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, BackendError> {
        Ok(self
            .0
            .iter()
            .take(top_k)
            .map(|(id, d)| (id.to_string(), *d))
            .collect())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct UnreachableBackend;

#[async_trait]
impl VectorSearchBackend for UnreachableBackend {
    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<(String, f32)>, BackendError> {
        Err(BackendError::unavailable("vector-db", "connection refused"))
    }

    fn name(&self) -> &str {
        "vector-db"
    }
}

/// Scores a document by how many query characters it contains
struct CharOverlapScorer;

#[async_trait]
impl PairwiseScorer for CharOverlapScorer {
    async fn score_batch(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, BackendError> {
        Ok(documents
            .iter()
            .map(|doc| query.chars().filter(|c| doc.contains(*c)).count() as f32)
            .collect())
    }
}

fn hit(index: &LexicalIndex, id: &str, rank: usize, source: SourceTag) -> RetrievalHit {
    RetrievalHit::new(Arc::clone(index.document(id).unwrap()), 1.0, rank, source)
}

fn ranked(index: &LexicalIndex, ids: &[&str], source: SourceTag) -> Vec<RetrievalHit> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| hit(index, id, i + 1, source))
        .collect()
}

fn ids(hits: &[RetrievalHit]) -> Vec<String> {
    hits.iter().map(|h| h.document_id().to_string()).collect()
}

#[test]
fn test_fusion_order_invariance() {
    let index = lexical_index();
    let variant_a = ranked(&index, &["doc_0", "doc_5", "doc_1"], SourceTag::Lexical);
    let variant_b = ranked(&index, &["doc_5", "doc_2"], SourceTag::Lexical);
    let dense_a = ranked(&index, &["doc_3", "doc_0"], SourceTag::Dense);
    let dense_b = ranked(&index, &["doc_2", "doc_4", "doc_0"], SourceTag::Dense);

    let forward = reciprocal_rank_fusion(
        FusionInput {
            lexical: vec![variant_a.clone(), variant_b.clone()],
            dense: Ok(vec![dense_a.clone(), dense_b.clone()]),
        },
        &FusionConfig::default(),
        10,
    );
    let reversed = reciprocal_rank_fusion(
        FusionInput {
            lexical: vec![variant_b, variant_a],
            dense: Ok(vec![dense_b, dense_a]),
        },
        &FusionConfig::default(),
        10,
    );

    assert_eq!(ids(&forward), ids(&reversed));
    for (f, r) in forward.iter().zip(&reversed) {
        assert!((f.score() - r.score()).abs() < 1e-9);
    }
    println!("✓ Fusion ranking independent of list order: {:?}", ids(&forward));
}

#[test]
fn test_fusion_completeness() {
    let index = lexical_index();
    let lexical = ranked(&index, &["doc_0", "doc_1", "doc_5"], SourceTag::Lexical);
    let dense = ranked(&index, &["doc_5", "doc_2", "doc_3"], SourceTag::Dense);

    let fused = reciprocal_rank_fusion(
        FusionInput {
            lexical: vec![lexical],
            dense: Ok(vec![dense]),
        },
        &FusionConfig::default(),
        100,
    );

    let unique: HashSet<String> = ids(&fused).into_iter().collect();
    assert_eq!(fused.len(), 5);
    assert_eq!(unique.len(), 5);
    assert!(fused.iter().all(|h| h.score() > 0.0));
    assert!(fused.iter().all(|h| h.source() == SourceTag::Fused));
    assert_eq!(fused[0].document_id(), "doc_5");
}

#[test]
fn test_rrf_reference_scores() {
    let index = lexical_index();

    let single = reciprocal_rank_fusion(
        FusionInput {
            lexical: vec![ranked(&index, &["doc_0"], SourceTag::Lexical)],
            dense: Ok(vec![Vec::new()]),
        },
        &FusionConfig::default(),
        10,
    );
    assert!((single[0].score() - 1.0 / 61.0).abs() < 1e-6);

    let both = reciprocal_rank_fusion(
        FusionInput {
            lexical: vec![ranked(&index, &["doc_0"], SourceTag::Lexical)],
            dense: Ok(vec![ranked(&index, &["doc_0"], SourceTag::Dense)]),
        },
        &FusionConfig::default(),
        10,
    );
    assert!((both[0].score() - 2.0 / 61.0).abs() < 1e-6);
}

#[test]
fn test_lexical_exclusion() {
    let index = lexical_index();

    // Shares no term with any document
    assert!(index.search("hello world", 10).is_empty());

    let hits = index.search("走路", 10);
    assert_eq!(ids(&hits), vec!["doc_1"]);
    assert!(hits.iter().all(|h| h.score() > 0.0));
}

#[tokio::test]
async fn test_degraded_dense_equals_lexical_ranking() {
    let lexical = lexical_index();
    let dense = DenseIndexAdapter::new(
        Arc::new(UnreachableBackend),
        Arc::clone(&lexical),
        Duration::from_secs(1),
    );
    let corpus = CorpusIndex::new(Arc::clone(&lexical), Some(dense));
    let searcher = HybridSearcher::new(
        Some(Arc::new(FlatEmbedder)),
        Duration::from_secs(1),
        FusionConfig::default(),
    );

    let results = searcher
        .search(&corpus, &["食糜".to_string()], 10)
        .await
        .unwrap();

    let lexical_only = lexical.search("食糜", 10);
    assert_eq!(ids(&results.hits), ids(&lexical_only));
    assert!(results.hits.iter().all(|h| h.source() == SourceTag::Lexical));
    assert_eq!(results.degraded.len(), 1);
    assert_eq!(results.degraded[0].backend(), "vector-db");
    println!("✓ Dense failure degraded to lexical ranking: {:?}", ids(&results.hits));
}

#[tokio::test]
async fn test_hybrid_then_rerank() {
    let lexical = lexical_index();
    let backend = ScriptedBackend(vec![("doc_5", 0.1), ("doc_0", 0.3), ("doc_2", 0.8)]);
    let dense = DenseIndexAdapter::new(Arc::new(backend), Arc::clone(&lexical), Duration::from_secs(1));
    let corpus = CorpusIndex::new(Arc::clone(&lexical), Some(dense));
    let searcher = HybridSearcher::new(
        Some(Arc::new(FlatEmbedder)),
        Duration::from_secs(1),
        FusionConfig::default(),
    );

    let fused = searcher
        .search(&corpus, &["食".to_string(), "喝粥".to_string()], 10)
        .await
        .unwrap();
    assert!(fused.degraded.is_empty());
    assert!(fused.hits.iter().all(|h| h.source() == SourceTag::Fused));
    assert!(ids(&fused.hits).contains(&"doc_2".to_string()));

    let reranker = RerankerAdapter::new(Arc::new(CharOverlapScorer), Duration::from_secs(1));
    let outcome = reranker.rerank("食糜", fused.hits, 2).await;

    assert!(outcome.degraded.is_none());
    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(outcome.hits[0].document_id(), "doc_5");
    assert_eq!(outcome.hits[0].source(), SourceTag::Reranked);
    assert_eq!(outcome.hits[0].rank(), 1);
}

#[tokio::test]
async fn test_reranker_passthrough_keeps_fusion_order() {
    let index = lexical_index();
    let candidates = ranked(&index, &["doc_2", "doc_0", "doc_4"], SourceTag::Fused);

    let outcome = RerankerAdapter::disabled().rerank("食", candidates, 2).await;

    assert_eq!(ids(&outcome.hits), vec!["doc_2", "doc_0"]);
    assert!((outcome.hits[0].score() - 1.0).abs() < 1e-6);
    assert!((outcome.hits[1].score() - 0.9).abs() < 1e-6);
    assert!(outcome.hits.iter().all(|h| h.source() == SourceTag::Fused));

    let empty = RerankerAdapter::disabled().rerank("食", Vec::new(), 2).await;
    assert!(empty.hits.is_empty());
}

#[tokio::test]
#[ignore] // Requires model download
async fn test_real_models_hybrid_search() {
    println!("\n=== Integration Test: Hybrid Retrieval with FastEmbed ===\n");

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        FastEmbedProvider::with_default_model().expect("Failed to initialize embedding provider"),
    );
    println!(
        "✓ Embedding provider initialized: {} ({}D)",
        provider.model_name(),
        provider.dimension()
    );

    let store = InMemoryDocumentStore::from_contents(VOCABULARY);
    let options = DenseIndexOptions {
        provider: Arc::clone(&provider),
        params: HnswParams::default(),
        batch_size: 4,
        search_timeout: Duration::from_secs(5),
    };
    let corpus = CorpusIndex::build(&store, Some(&options)).await.unwrap();
    assert!(corpus.has_dense());
    println!("✓ Corpus indexed: {} documents", corpus.len());

    let searcher = HybridSearcher::new(Some(provider), Duration::from_secs(30), FusionConfig::default());
    let fused = searcher
        .search(&corpus, &["吃饭怎么说".to_string()], 5)
        .await
        .unwrap();
    assert!(fused.degraded.is_empty());
    assert_eq!(fused.hits[0].document_id(), "doc_0");
    println!("✓ Hybrid search top hit: {}", fused.hits[0].content());

    let scorer = FastEmbedScorer::with_default_model().expect("Failed to create reranker");
    let reranker = RerankerAdapter::new(Arc::new(scorer), Duration::from_secs(60));
    let outcome = reranker.rerank("吃饭怎么说", fused.hits, 2).await;
    assert!(outcome.degraded.is_none());
    assert_eq!(outcome.hits[0].source(), SourceTag::Reranked);
    println!("✓ Reranked top hit: {}", outcome.hits[0].content());
}
