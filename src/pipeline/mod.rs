//! Question answering pipeline
//!
//! `answer` runs: classify → select strategy → (expand) → hybrid search per
//! variant → fuse → rerank → generate → validate. Backend failures before
//! generation degrade the request; generation failures end it.

use crate::config::{config_duration, Config};
use crate::corpus::{DocumentStore, FileDocumentStore};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{PuxianError, Result};
use crate::llm::{
    complete_with_timeout, CompletionRequest, GenerativeModel, LlmError, OpenAiCompatibleClient,
};
use crate::patterns::IntentPatternRegistry;
use crate::query::{
    prompt, ClassificationSource, QueryClassification, QueryClassifier, QueryExpander, QueryType,
    RetrievalStrategy, StrategySelector,
};
use crate::retrieval::{
    BackendError, CorpusIndex, DenseIndexOptions, FastEmbedScorer, HybridSearcher, RerankerAdapter,
    RetrievalHit, RetrievedDocument,
};
use crate::validation::{AnswerValidator, ValidationResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

/// Generation and deadline parameters
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub max_tokens: u32,
    pub top_p: f32,
    pub generation_timeout: Duration,
    /// Deadline for the whole request; in-flight work is dropped on expiry
    pub request_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            top_p: 0.9,
            generation_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Collaborators the pipeline is assembled from
pub struct PipelineComponents {
    pub classifier: QueryClassifier,
    /// Without an expander every strategy searches the original query only
    pub expander: Option<QueryExpander>,
    pub searcher: HybridSearcher,
    pub reranker: RerankerAdapter,
    pub generator: Arc<dyn GenerativeModel>,
    pub validator: AnswerValidator,
    /// Used when the corpus is (re)loaded; `None` keeps it lexical-only
    pub dense_index: Option<DenseIndexOptions>,
}

/// A backend that failed during a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedBackend {
    pub backend: String,
    pub reason: String,
}

impl From<&BackendError> for DegradedBackend {
    fn from(err: &BackendError) -> Self {
        Self {
            backend: err.backend().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result of the retrieval half of a request
#[derive(Debug)]
pub struct RetrievalReport {
    pub classification: QueryClassification,
    pub strategy: RetrievalStrategy,
    /// Query strings actually searched, original first
    pub variants: Vec<String>,
    /// Final supporting hits, at most `strategy.final_depth`
    pub hits: Vec<RetrievalHit>,
    pub degraded: Vec<DegradedBackend>,
    pub retrieval_ms: u64,
}

/// Everything returned to the caller of `answer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub query: String,
    pub query_type: QueryType,
    pub classification_confidence: f32,
    pub strategy: String,
    /// Answer with citations and any warning prefix
    pub answer: String,
    pub raw_answer: String,
    pub confidence: f32,
    pub citations: Vec<String>,
    pub warning: Option<String>,
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub query_variants: Vec<String>,
    pub degraded: Vec<DegradedBackend>,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
}

impl AnswerResponse {
    fn new(
        query: &str,
        report: RetrievalReport,
        validation: ValidationResult,
        generation_ms: u64,
    ) -> Self {
        Self {
            query: query.to_string(),
            query_type: report.classification.label,
            classification_confidence: report.classification.confidence,
            strategy: report.strategy.description.to_string(),
            answer: validation.annotated_answer,
            raw_answer: validation.raw_answer,
            confidence: validation.confidence,
            citations: validation.citations,
            warning: validation.warning,
            retrieved_documents: report.hits.iter().map(RetrievedDocument::from).collect(),
            query_variants: report.variants,
            degraded: report.degraded,
            retrieval_ms: report.retrieval_ms,
            generation_ms,
        }
    }

    /// True when the answer is the fixed no-knowledge refusal
    pub fn is_refusal(&self) -> bool {
        self.retrieved_documents.is_empty()
    }
}

pub struct AnswerPipeline {
    corpus: RwLock<Option<Arc<CorpusIndex>>>,
    classifier: QueryClassifier,
    expander: Option<QueryExpander>,
    searcher: HybridSearcher,
    reranker: RerankerAdapter,
    generator: Arc<dyn GenerativeModel>,
    validator: AnswerValidator,
    dense_index: Option<DenseIndexOptions>,
    settings: PipelineSettings,
}

impl AnswerPipeline {
    /// Pipeline with no corpus loaded; see [`AnswerPipeline::reload`]
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            corpus: RwLock::new(None),
            classifier: components.classifier,
            expander: components.expander,
            searcher: components.searcher,
            reranker: components.reranker,
            generator: components.generator,
            validator: components.validator,
            dense_index: components.dense_index,
            settings,
        }
    }

    /// Assemble the production pipeline and load the configured corpus.
    ///
    /// Models that fail to load are logged and left out; the pipeline then
    /// runs lexical-only or without reranking.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let generator: Arc<dyn GenerativeModel> = Arc::new(OpenAiCompatibleClient::new(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            config.llm_api_key(),
        ));

        let patterns = match &config.classifier.patterns_file {
            Some(path) => IntentPatternRegistry::from_config_file(path)?,
            None => IntentPatternRegistry::embedded()?,
        };
        let classifier = QueryClassifier::new(
            patterns,
            Some(Arc::clone(&generator)),
            config.classifier_settings()?,
        );
        let expander = QueryExpander::new(Arc::clone(&generator), config.expander_settings()?);

        let embedder = if config.embedding.enabled {
            load_embedder(&config.embedding.model).await
        } else {
            tracing::info!("Dense retrieval disabled by configuration");
            None
        };

        let reranker = if config.reranker.enabled {
            match FastEmbedScorer::new(&config.reranker.model) {
                Ok(scorer) => RerankerAdapter::new(
                    Arc::new(scorer),
                    config_duration("reranker.timeout", &config.reranker.timeout)?,
                ),
                Err(e) => {
                    tracing::warn!(backend = "reranker", error = %e, "Reranker unavailable, using fusion order");
                    RerankerAdapter::disabled()
                }
            }
        } else {
            RerankerAdapter::disabled()
        };

        let dense_index = match &embedder {
            Some(provider) => Some(DenseIndexOptions {
                provider: Arc::clone(provider),
                params: config.hnsw_params(),
                batch_size: config.embedding.batch_size,
                search_timeout: config_duration(
                    "retrieval.dense_timeout",
                    &config.retrieval.dense_timeout,
                )?,
            }),
            None => None,
        };

        let mut searcher = HybridSearcher::new(
            embedder.clone(),
            config_duration("embedding.timeout", &config.embedding.timeout)?,
            config.fusion_config()?,
        );
        if config.embedding.enabled && embedder.is_none() {
            searcher = searcher.with_embedder_outage(BackendError::unavailable(
                "embedding",
                format!("model {} failed to load", config.embedding.model),
            ));
        }

        let settings = PipelineSettings {
            max_tokens: config.llm.max_tokens,
            top_p: config.llm.top_p,
            generation_timeout: config_duration(
                "llm.generation_timeout",
                &config.llm.generation_timeout,
            )?,
            request_timeout: config_duration(
                "retrieval.request_timeout",
                &config.retrieval.request_timeout,
            )?,
        };

        let pipeline = Self::new(
            PipelineComponents {
                classifier,
                expander: Some(expander),
                searcher,
                reranker,
                generator,
                validator: AnswerValidator::new(config.validator_settings()),
                dense_index,
            },
            settings,
        );

        let store = FileDocumentStore::new(config.corpus_path()?);
        pipeline.reload(&store).await?;

        Ok(pipeline)
    }

    /// Rebuild the indexes from `store` and swap them in.
    ///
    /// Returns the number of documents now searchable. An empty store
    /// clears the corpus, so later requests get the refusal answer.
    pub async fn reload(&self, store: &dyn DocumentStore) -> Result<usize> {
        match CorpusIndex::build(store, self.dense_index.as_ref()).await {
            Ok(index) => {
                let count = index.len();
                self.swap_corpus(Some(Arc::new(index))).await;
                Ok(count)
            }
            Err(PuxianError::EmptyCorpus) => {
                tracing::warn!("Corpus is empty, answers will be refusals");
                self.swap_corpus(None).await;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the active corpus; requests already running keep the old one
    pub async fn swap_corpus(&self, corpus: Option<Arc<CorpusIndex>>) -> Option<Arc<CorpusIndex>> {
        let mut guard = self.corpus.write().await;
        std::mem::replace(&mut *guard, corpus)
    }

    /// Number of documents in the active corpus
    pub async fn corpus_len(&self) -> usize {
        self.corpus
            .read()
            .await
            .as_ref()
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub async fn classify(&self, query: &str) -> QueryClassification {
        self.classifier.classify(query).await
    }

    /// Answer a question from the corpus.
    ///
    /// No corpus or no supporting documents yields a refusal, not an error.
    /// Generation errors and timeouts are returned as
    /// `GenerationFailed` / `GenerationTimeout`.
    pub async fn answer(&self, query: &str) -> Result<AnswerResponse> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("answer", request_id = %request_id);
        let deadline = self.settings.request_timeout;

        match tokio::time::timeout(deadline, self.answer_inner(query).instrument(span)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%request_id, after = ?deadline, "Request deadline exceeded");
                Err(PuxianError::RequestTimeout { after: deadline })
            }
        }
    }

    async fn answer_inner(&self, query: &str) -> Result<AnswerResponse> {
        let report = self.retrieve(query, None).await?;

        if report.hits.is_empty() {
            tracing::info!(query_type = %report.classification.label, "No supporting documents, refusing");
            let refusal = self.validator.refusal("");
            return Ok(AnswerResponse::new(query, report, refusal, 0));
        }

        let started = Instant::now();
        let request = CompletionRequest::new(
            prompt::answer(report.classification.label, query, &report.hits),
            self.settings.max_tokens,
            report.strategy.temperature,
            self.settings.generation_timeout,
        )
        .with_top_p(self.settings.top_p);

        let raw_answer = complete_with_timeout(self.generator.as_ref(), &request)
            .await
            .map_err(|e| {
                tracing::error!(backend = self.generator.name(), error = %e, "Answer generation failed");
                match e {
                    LlmError::Timeout(after) => PuxianError::GenerationTimeout { after },
                    other => PuxianError::GenerationFailed(other.to_string()),
                }
            })?;
        let generation_ms = started.elapsed().as_millis() as u64;

        let validation = self.validator.validate(query, &raw_answer, &report.hits);
        tracing::info!(
            query_type = %report.classification.label,
            confidence = validation.confidence,
            documents = report.hits.len(),
            degraded = report.degraded.len(),
            generation_ms,
            "Answer generated"
        );

        Ok(AnswerResponse::new(query, report, validation, generation_ms))
    }

    /// Retrieval without generation.
    ///
    /// `label` forces a strategy instead of classifying the query.
    pub async fn retrieve(&self, query: &str, label: Option<QueryType>) -> Result<RetrievalReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PuxianError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let classification = match label {
            Some(label) => QueryClassification {
                label,
                confidence: 1.0,
                source: ClassificationSource::Forced,
            },
            None => self.classifier.classify(query).await,
        };
        let strategy = StrategySelector::select(classification.label);
        tracing::debug!(
            query_type = %classification.label,
            confidence = classification.confidence,
            candidate_depth = strategy.candidate_depth,
            final_depth = strategy.final_depth,
            "Strategy selected"
        );

        // Snapshot so a concurrent reload cannot change the corpus mid-request
        let corpus = self.corpus.read().await.clone();
        let corpus = match corpus {
            Some(corpus) if !corpus.is_empty() => corpus,
            _ => {
                return Ok(RetrievalReport {
                    classification,
                    strategy,
                    variants: vec![query.to_string()],
                    hits: Vec::new(),
                    degraded: Vec::new(),
                    retrieval_ms: 0,
                })
            }
        };

        let started = Instant::now();

        let variants = match (&self.expander, strategy.expand_query) {
            (Some(expander), true) => expander.expand(query).await,
            _ => vec![query.to_string()],
        };

        let fused = self
            .searcher
            .search(&corpus, &variants, strategy.candidate_depth)
            .await?;
        let mut degraded: Vec<DegradedBackend> = fused.degraded.iter().map(DegradedBackend::from).collect();

        let reranked = self
            .reranker
            .rerank(query, fused.hits, strategy.final_depth)
            .await;
        if let Some(err) = &reranked.degraded {
            degraded.push(DegradedBackend::from(err));
        }

        Ok(RetrievalReport {
            classification,
            strategy,
            variants,
            hits: reranked.hits,
            degraded,
            retrieval_ms: started.elapsed().as_millis() as u64,
        })
    }
}

async fn load_embedder(model: &str) -> Option<Arc<dyn EmbeddingProvider>> {
    let name = model.to_string();
    match tokio::task::spawn_blocking(move || FastEmbedProvider::new(&name)).await {
        Ok(Ok(provider)) => Some(Arc::new(provider) as Arc<dyn EmbeddingProvider>),
        Ok(Err(e)) => {
            tracing::warn!(backend = "embedding", error = %e, "Embedding model unavailable, retrieval is lexical-only");
            None
        }
        Err(e) => {
            tracing::warn!(backend = "embedding", error = %e, "Embedding model load task failed");
            None
        }
    }
}
