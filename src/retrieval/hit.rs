//! Retrieval hits and their provenance tags

use crate::corpus::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which stage produced a hit's score.
///
/// A reranker that fell back to passthrough keeps the incoming tag instead of
/// `Reranked`, and fusion that ran without dense results tags its output
/// `Lexical`, so degraded requests are visible from the hits alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Lexical,
    Dense,
    Fused,
    Reranked,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Lexical => "lexical",
            SourceTag::Dense => "dense",
            SourceTag::Fused => "fused",
            SourceTag::Reranked => "reranked",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked reference to a corpus document.
///
/// Hits are never edited after creation; every stage that changes order or
/// score builds new hits.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    document: Arc<Document>,
    score: f32,
    rank: usize,
    source: SourceTag,
}

impl RetrievalHit {
    /// Create a hit; `rank` is 1-based
    pub fn new(document: Arc<Document>, score: f32, rank: usize, source: SourceTag) -> Self {
        Self {
            document,
            score,
            rank,
            source,
        }
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn document_id(&self) -> &str {
        self.document.id()
    }

    pub fn content(&self) -> &str {
        self.document.content()
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Short preview of the document text
    pub fn preview(&self, max_chars: usize) -> String {
        crate::text::preview(self.content(), max_chars)
    }
}

/// Serializable view of a hit for callers outside the crate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub rank: usize,
    pub source: SourceTag,
}

impl From<&RetrievalHit> for RetrievedDocument {
    fn from(hit: &RetrievalHit) -> Self {
        Self {
            id: hit.document_id().to_string(),
            content: hit.content().to_string(),
            score: hit.score(),
            rank: hit.rank(),
            source: hit.source(),
        }
    }
}
