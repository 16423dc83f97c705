//! Generative model collaborator
//!
//! Classification fallback, query expansion and answer generation all go
//! through [`GenerativeModel::complete`]. Every request carries its own
//! timeout, which implementations must honour.

mod openai;

pub use openai::OpenAiCompatibleClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned an empty completion")]
    EmptyResponse,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// A single-turn completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature,
            top_p: None,
            timeout,
        }
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    fn name(&self) -> &str {
        "llm"
    }
}

/// Run a completion under its own deadline.
///
/// Used by callers so that a model implementation which ignores the
/// request timeout still cannot stall a request.
pub async fn complete_with_timeout(
    model: &dyn GenerativeModel,
    request: &CompletionRequest,
) -> Result<String, LlmError> {
    match tokio::time::timeout(request.timeout, model.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(request.timeout)),
    }
}
