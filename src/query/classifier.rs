//! Two-tier query classifier: deterministic patterns, then a model call

use super::{prompt, ClassificationSource, QueryClassification, QueryType};
use crate::error::PuxianError;
use crate::llm::{complete_with_timeout, CompletionRequest, GenerativeModel};
use crate::patterns::IntentPatternRegistry;
use std::sync::Arc;
use std::time::Duration;

const PATTERN_CONFIDENCE: f32 = 0.95;
const MODEL_CONFIDENCE: f32 = 0.85;
const MODEL_MAX_TOKENS: u32 = 10;
const MODEL_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct ClassifierSettings {
    /// Tier-1 results below this confidence go to the model
    pub confidence_threshold: f32,
    pub timeout: Duration,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct QueryClassifier {
    patterns: IntentPatternRegistry,
    model: Option<Arc<dyn GenerativeModel>>,
    settings: ClassifierSettings,
}

impl QueryClassifier {
    pub fn new(
        patterns: IntentPatternRegistry,
        model: Option<Arc<dyn GenerativeModel>>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            patterns,
            model,
            settings,
        }
    }

    /// Tier 1 only: first matching pattern group, else the factual default
    pub fn classify_by_patterns(&self, query: &str) -> QueryClassification {
        match self.patterns.first_match(query) {
            Some(m) => {
                tracing::debug!(label = %m.label, pattern = m.pattern, "Query matched intent pattern");
                QueryClassification {
                    label: m.label,
                    confidence: PATTERN_CONFIDENCE,
                    source: ClassificationSource::Pattern,
                }
            }
            None => QueryClassification::default_factual(),
        }
    }

    /// Classify a query, asking the model only when patterns are inconclusive.
    ///
    /// Never fails: model errors, timeouts and unparseable output all map to
    /// the factual default.
    pub async fn classify(&self, query: &str) -> QueryClassification {
        let tier1 = self.classify_by_patterns(query);
        if tier1.confidence >= self.settings.confidence_threshold {
            return tier1;
        }

        let model = match &self.model {
            Some(model) => model,
            None => return tier1,
        };

        match self.classify_with_model(model.as_ref(), query).await {
            Ok(label) => QueryClassification {
                label,
                confidence: MODEL_CONFIDENCE,
                source: ClassificationSource::Model,
            },
            Err(e) => {
                tracing::warn!(backend = model.name(), error = %e, "Using default classification");
                QueryClassification::default_factual()
            }
        }
    }

    /// Tier 2: ask the model for a label
    async fn classify_with_model(
        &self,
        model: &dyn GenerativeModel,
        query: &str,
    ) -> crate::error::Result<QueryType> {
        let request = CompletionRequest::new(
            prompt::classification(query),
            MODEL_MAX_TOKENS,
            MODEL_TEMPERATURE,
            self.settings.timeout,
        );

        let output = complete_with_timeout(model, &request)
            .await
            .map_err(|e| PuxianError::ClassificationFailed(e.to_string()))?;

        parse_label(&output).ok_or_else(|| {
            PuxianError::ClassificationFailed(format!("unrecognised label in {:?}", output.trim()))
        })
    }
}

/// First label, in priority order, contained in the model output
fn parse_label(output: &str) -> Option<QueryType> {
    let lowered = output.to_lowercase();
    QueryType::ALL
        .into_iter()
        .find(|label| lowered.contains(label.as_str()))
}
