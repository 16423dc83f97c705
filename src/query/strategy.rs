//! Per-intent retrieval strategy lookup

use super::QueryType;
use serde::Serialize;

/// Retrieval and generation parameters for one intent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalStrategy {
    pub label: QueryType,
    /// Candidates kept after fusion
    pub candidate_depth: usize,
    /// Documents kept after reranking and given to generation
    pub final_depth: usize,
    /// Whether the query is expanded into rewrites before retrieval
    pub expand_query: bool,
    pub temperature: f32,
    pub description: &'static str,
}

const STRATEGIES: [RetrievalStrategy; 4] = [
    RetrievalStrategy {
        label: QueryType::Factual,
        candidate_depth: 10,
        final_depth: 2,
        expand_query: false,
        temperature: 0.3,
        description: "High-precision retrieval, answer directly",
    },
    RetrievalStrategy {
        label: QueryType::Example,
        candidate_depth: 20,
        final_depth: 5,
        expand_query: true,
        temperature: 0.7,
        description: "High-recall retrieval, rich example sentences",
    },
    RetrievalStrategy {
        label: QueryType::Comparison,
        candidate_depth: 15,
        final_depth: 4,
        expand_query: true,
        temperature: 0.5,
        description: "Multi-angle retrieval for side-by-side comparison",
    },
    RetrievalStrategy {
        label: QueryType::Context,
        candidate_depth: 12,
        final_depth: 3,
        expand_query: true,
        temperature: 0.6,
        description: "Background retrieval for origin and cultural history",
    },
];

/// Static label-to-strategy table
pub struct StrategySelector;

impl StrategySelector {
    pub fn select(label: QueryType) -> RetrievalStrategy {
        STRATEGIES
            .iter()
            .find(|s| s.label == label)
            .copied()
            .unwrap_or(STRATEGIES[0])
    }

    /// Lookup by label name; unknown names get the factual row
    pub fn select_by_name(label: &str) -> RetrievalStrategy {
        match label.parse::<QueryType>() {
            Ok(label) => Self::select(label),
            Err(_) => {
                tracing::debug!(label, "Unknown query type, using factual strategy");
                STRATEGIES[0]
            }
        }
    }

    pub fn all() -> &'static [RetrievalStrategy] {
        &STRATEGIES
    }
}
