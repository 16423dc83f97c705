//! Query understanding: intent classification, strategy selection,
//! expansion and prompt assembly

mod classifier;
mod expander;
pub mod prompt;
mod strategy;

pub use classifier::{ClassifierSettings, QueryClassifier};
pub use expander::{ExpanderSettings, QueryExpander};
pub use strategy::{RetrievalStrategy, StrategySelector};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Intent label of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Factual,
    Example,
    Comparison,
    Context,
}

impl QueryType {
    /// All labels in classification priority order
    pub const ALL: [QueryType; 4] = [
        QueryType::Factual,
        QueryType::Example,
        QueryType::Comparison,
        QueryType::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Factual => "factual",
            QueryType::Example => "example",
            QueryType::Comparison => "comparison",
            QueryType::Context => "context",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        QueryType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown query type: {}", s))
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// A deterministic pattern matched
    Pattern,
    /// The model fallback produced a label
    Model,
    /// Nothing conclusive; the factual default applies
    Default,
    /// Chosen by the caller instead of classified
    Forced,
}

/// Intent label with its confidence in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryClassification {
    pub label: QueryType,
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl QueryClassification {
    /// Fallback used whenever neither tier is conclusive
    pub fn default_factual() -> Self {
        Self {
            label: QueryType::Factual,
            confidence: 0.5,
            source: ClassificationSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_parsing() {
        assert_eq!("Comparison".parse::<QueryType>(), Ok(QueryType::Comparison));
        assert_eq!(" context ".parse::<QueryType>(), Ok(QueryType::Context));
        assert!("poetry".parse::<QueryType>().is_err());
    }

    #[test]
    fn test_serde_labels() {
        let json = serde_json::to_string(&QueryType::Example).unwrap();
        assert_eq!(json, "\"example\"");
    }
}
