//! OpenAI-compatible chat completions client (vLLM, llama.cpp server, ...)

use super::{CompletionRequest, GenerativeModel, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Client for a server exposing `/chat/completions` and `/models`.
///
/// When no model is configured, the first model the server lists is used;
/// discovery runs once, on the first completion.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: OnceCell<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, model: Option<String>, api_key: Option<String>) -> Self {
        let model = match model {
            Some(name) => OnceCell::new_with(Some(name)),
            None => OnceCell::new(),
        };

        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn model(&self) -> Result<&str, LlmError> {
        self.model
            .get_or_try_init(|| self.discover_model())
            .await
            .map(String::as_str)
    }

    async fn discover_model(&self) -> Result<String, LlmError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let model = models
            .data
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| LlmError::Decode("server lists no models".to_string()))?;

        tracing::info!("Using generation model discovered from server: {}", model);
        Ok(model)
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let model = self.model().await?;

        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorize(self.http.post(&url))
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(request.timeout)
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
