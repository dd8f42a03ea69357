//! Google Gemini REST provider.
//!
//! System prompts travel as `systemInstruction`; JSON mode is requested with
//! `generationConfig.responseMimeType = "application/json"`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Backend, ChatRequest, ChatResponse, DEFAULT_TIMEOUT_SECS, EmbedRequest, EmbedResponse,
    ModelProvider, ResponseFormat, Role, StopReason, Usage,
};
use crate::auth::ApiKey;
use crate::{Error, Result};

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Provider for the Gemini `generateContent` API.
pub struct GeminiProvider {
    base_url: String,
    api_key: ApiKey,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiProvider {
    /// Create a provider against the public Gemini endpoint.
    pub fn new(api_key: ApiKey) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a provider against a custom endpoint.
    pub fn with_base_url(api_key: ApiKey, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the per-request deadline.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn post<B: Serialize>(&self, model: &str, action: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{}", self.base_url, model, action);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderApi(format!(
                "Gemini API returned status {status}: {body}"
            )));
        }
        Ok(response)
    }
}

fn to_generate_request(request: &ChatRequest) -> GenerateRequest {
    let system_instruction = request.system_prompt().map(|text| Content {
        role: None,
        parts: vec![Part {
            text: text.to_string(),
        }],
    });
    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: Some(match m.role {
                Role::Assistant => "model",
                _ => "user",
            }),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            response_mime_type: (request.response_format == ResponseFormat::Json)
                .then_some("application/json"),
        },
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn backend(&self) -> Backend {
        Backend::Gemini
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = to_generate_request(&request);
        debug!(model = %request.model, "sending Gemini generateContent request");
        let response = self.post(&request.model, "generateContent", &body).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("no candidates in response".to_string()))?;
        let stop_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        };
        let content = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(ChatResponse {
            content,
            stop_reason,
            usage: Usage::new(usage.prompt_token_count, usage.candidates_token_count),
        })
    }

    async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        let body = BatchEmbedRequest {
            requests: request
                .texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", request.model),
                    content: Content {
                        role: None,
                        parts: vec![Part { text: text.clone() }],
                    },
                })
                .collect(),
        };
        let response = self
            .post(&request.model, "batchEmbedContents", &body)
            .await?;
        let parsed: BatchEmbedResponse = response
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
            embeddings: parsed.embeddings.into_iter().map(|e| e.values).collect(),
            usage: Usage::default(),
        })
    }
}
