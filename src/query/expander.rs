//! Query expansion into model-written rewrites

use super::prompt;
use crate::llm::{complete_with_timeout, CompletionRequest, GenerativeModel};
use std::sync::Arc;
use std::time::Duration;

const EXPAND_MAX_TOKENS: u32 = 150;
const EXPAND_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct ExpanderSettings {
    /// Rewrites kept in addition to the original query
    pub max_rewrites: usize,
    pub timeout: Duration,
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self {
            max_rewrites: 3,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct QueryExpander {
    model: Arc<dyn GenerativeModel>,
    settings: ExpanderSettings,
}

impl QueryExpander {
    pub fn new(model: Arc<dyn GenerativeModel>, settings: ExpanderSettings) -> Self {
        Self { model, settings }
    }

    /// The original query followed by up to `max_rewrites` rewrites.
    ///
    /// The first element is always `query` itself; a failed model call
    /// yields just `[query]`.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let request = CompletionRequest::new(
            prompt::expansion(query, self.settings.max_rewrites),
            EXPAND_MAX_TOKENS,
            EXPAND_TEMPERATURE,
            self.settings.timeout,
        );

        match complete_with_timeout(self.model.as_ref(), &request).await {
            Ok(output) => {
                let variants = parse_rewrites(query, &output, self.settings.max_rewrites);
                tracing::debug!(count = variants.len() - 1, "Query expanded");
                variants
            }
            Err(e) => {
                tracing::warn!(backend = self.model.name(), error = %e, "Query expansion failed, searching original query only");
                vec![query.to_string()]
            }
        }
    }
}

/// Split model output into rewrites, original first
fn parse_rewrites(query: &str, output: &str, max_rewrites: usize) -> Vec<String> {
    let original = query.trim();
    let mut variants = vec![query.to_string()];

    for line in output.lines().map(str::trim) {
        if variants.len() > max_rewrites {
            break;
        }
        if line.is_empty() || line == original || variants.iter().any(|v| v == line) {
            continue;
        }
        variants.push(line.to_string());
    }

    variants
}
