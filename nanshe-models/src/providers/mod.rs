//! Model provider trait and implementations.
//!
//! The [`ModelProvider`] trait defines the unified interface for every
//! backend the engine can talk to. Each provider is responsible for
//! enforcing [`ResponseFormat::Json`] through its own native switch so the
//! caller never has to know which backend answered.
//!
//! # Example
//!
//! ```ignore
//! use nanshe_models::providers::{ModelProvider, ChatRequest, Message};
//!
//! async fn ask(provider: &dyn ModelProvider) {
//!     let request = ChatRequest::new(
//!         "gpt-4o-mini",
//!         vec![Message::user("Return {\"ok\": true} as json")],
//!     )
//!     .json();
//!
//!     let response = provider.chat(request).await?;
//!     println!("Response: {}", response.content);
//! }
//! ```

mod gemini;
mod ollama;
mod openai;
mod types;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use types::*;

use crate::{Error, Result};

/// Default request deadline for chat calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// The backends a model id can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI-compatible chat completions (JSON mode).
    OpenAi,
    /// Local Ollama server (`/api/chat`, `format: json`).
    Ollama,
    /// Google Gemini REST (`responseMimeType: application/json`).
    Gemini,
}

impl Backend {
    /// Prefix used in `provider:model` ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
            Backend::Gemini => "gemini",
        }
    }

    /// Split a model choice into its backend and bare model name.
    ///
    /// Ids without a prefix route to OpenAI, which matches how most
    /// deployments name their default model.
    pub fn resolve(model_choice: &str) -> Result<(Backend, String)> {
        // split on the first colon only: `ollama:llama3:8b` keeps its tag
        match model_choice.split_once(':') {
            Some((prefix, model)) => Ok((prefix.parse()?, model.to_string())),
            None => Ok((Backend::OpenAi, model_choice.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Backend::OpenAi),
            "ollama" | "local" => Ok(Backend::Ollama),
            "gemini" | "google" => Ok(Backend::Gemini),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Trait for model providers (cloud and local).
///
/// # Required Methods
///
/// - [`name`](ModelProvider::name) - Provider identifier
/// - [`backend`](ModelProvider::backend) - Which backend this provider serves
/// - [`chat`](ModelProvider::chat) - Non-streaming chat completion
///
/// # Optional Methods
///
/// - [`embed`](ModelProvider::embed) - Text embeddings (returns error by default)
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Returns the backend this provider implements.
    fn backend(&self) -> Backend;

    /// Perform a chat completion request.
    ///
    /// When `request.response_format` is [`ResponseFormat::Json`] the
    /// provider must ask its API for a JSON object.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Generate text embeddings.
    ///
    /// # Default Implementation
    ///
    /// Returns an error indicating embeddings are not supported.
    async fn embed(&self, _request: EmbedRequest) -> Result<EmbedResponse> {
        Err(Error::ProviderApi(format!(
            "embeddings not supported by provider '{}'",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mock provider for testing the trait.
    struct EchoProvider;

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn backend(&self) -> Backend {
            Backend::OpenAi
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: format!("Echo: {}", request.messages[0].content),
                stop_reason: StopReason::EndTurn,
                usage: Usage::new(10, 5),
            })
        }
    }

    #[tokio::test]
    async fn mock_provider_chat_returns_response() {
        let provider = EchoProvider;
        let request = ChatRequest::new("test-model", vec![Message::user("Hello")]);
        let response = provider.chat(request).await.unwrap();

        assert_eq!(response.content, "Echo: Hello");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn default_embed_returns_error() {
        let provider = EchoProvider;
        let request = EmbedRequest::new("test-model", vec!["hello".to_string()]);
        let err = provider.embed(request).await.unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn backend_resolves_prefixed_ids() {
        let (backend, model) = Backend::resolve("gemini:gemini-1.5-flash").unwrap();
        assert_eq!(backend, Backend::Gemini);
        assert_eq!(model, "gemini-1.5-flash");

        let (backend, model) = Backend::resolve("ollama:llama3:8b").unwrap();
        assert_eq!(backend, Backend::Ollama);
        assert_eq!(model, "llama3:8b");
    }

    #[test]
    fn backend_defaults_to_openai() {
        let (backend, model) = Backend::resolve("gpt-4o-mini").unwrap();
        assert_eq!(backend, Backend::OpenAi);
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn backend_rejects_unknown_prefix() {
        let err = Backend::resolve("mystery:model").unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(name) if name == "mystery"));
    }
}
