//! Ollama local model provider.
//!
//! Talks to `/api/chat` with `stream: false` and `format: "json"` when the
//! caller needs an object back, and to `/api/embed` for embeddings.
//!
//! # Example
//!
//! ```ignore
//! use nanshe_models::providers::OllamaProvider;
//!
//! let provider = OllamaProvider::new();  // Uses localhost:11434
//! let provider = OllamaProvider::with_base_url("http://192.168.1.100:11434");
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Backend, ChatRequest, ChatResponse, DEFAULT_TIMEOUT_SECS, EmbedRequest, EmbedResponse,
    ModelProvider, ResponseFormat, StopReason, Usage,
};
use crate::{Error, Result};

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaChatOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl From<OllamaChatResponse> for ChatResponse {
    fn from(response: OllamaChatResponse) -> Self {
        let stop_reason = match response.done_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        Self {
            content: response.message.content,
            stop_reason,
            usage: Usage::new(
                response.prompt_eval_count.unwrap_or(0),
                response.eval_count.unwrap_or(0),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

/// Ollama local model provider.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default URL (localhost:11434).
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new Ollama provider with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the per-request deadline.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Get the base URL for this provider.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "Ollama API returned status {status}: {body}"
            )));
        }
        Ok(response)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn backend(&self) -> Backend {
        Backend::Ollama
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };
        let body = OllamaChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaChatMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            format: (request.response_format == ResponseFormat::Json).then_some("json"),
            options,
        };

        debug!(model = %request.model, "sending Ollama chat request");
        let response = self.post("/api/chat", &body).await?;
        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(parsed.into())
    }

    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        let body = OllamaEmbedRequest {
            model: &request.model,
            input: &request.texts,
        };
        let response = self.post("/api/embed", &body).await?;
        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        if parsed.embeddings.len() != request.texts.len() {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                request.texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(EmbedResponse {
            embeddings: parsed.embeddings,
            usage: Usage::new(parsed.prompt_eval_count.unwrap_or(0), 0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn new_uses_default_url() {
        let provider = OllamaProvider::new();
        assert_eq!(provider.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn with_base_url_trims_trailing_slash() {
        let provider = OllamaProvider::with_base_url("http://gpu-box:11434/");
        assert_eq!(provider.base_url(), "http://gpu-box:11434");
    }

    #[test]
    fn response_converts_usage() {
        let response = OllamaChatResponse {
            message: OllamaChatMessage {
                role: "assistant".to_string(),
                content: "{\"ok\":true}".to_string(),
            },
            done_reason: Some("length".to_string()),
            prompt_eval_count: Some(12),
            eval_count: Some(30),
        };
        let chat: ChatResponse = response.into();
        assert_eq!(chat.content, "{\"ok\":true}");
        assert_eq!(chat.stop_reason, StopReason::MaxTokens);
        assert_eq!(chat.usage.total_tokens, 42);
    }

    #[tokio::test]
    async fn chat_requests_json_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"format": "json", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": "{\"title\":\"Verbs\"}"},
                "done": true,
                "prompt_eval_count": 20,
                "eval_count": 8
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_base_url(server.uri());
        let request = ChatRequest::new("llama3", vec![Message::user("json please")]).json();
        let response = provider.chat(request).await.unwrap();

        assert_eq!(response.content, "{\"title\":\"Verbs\"}");
        assert_eq!(response.usage.input_tokens, 20);
    }

    #[tokio::test]
    async fn chat_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_base_url(server.uri());
        let err = provider
            .chat(ChatRequest::new("missing", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderApi(msg) if msg.contains("model not found")));
    }

    #[tokio::test]
    async fn embed_returns_vectors_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "nomic-embed-text",
                "embeddings": [[0.1, 0.2], [0.3, 0.4]],
                "prompt_eval_count": 6
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::with_base_url(server.uri());
        let response = provider
            .embed(EmbedRequest::new(
                "nomic-embed-text",
                vec!["a".to_string(), "b".to_string()],
            ))
            .await
            .unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert!((response.embeddings[1][0] - 0.3).abs() < 1e-6);
    }
}
