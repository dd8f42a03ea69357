//! Provider registry.
//!
//! Maps each [`Backend`] to a live provider so a `provider:model` choice can
//! be routed without the caller knowing which HTTP API sits behind it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{CredentialStore, ollama_host};
use crate::providers::{
    Backend, GeminiProvider, ModelProvider, OllamaProvider, OpenAiProvider,
};
use crate::{Error, Result};

/// Registered providers keyed by backend.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Backend, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from stored credentials.
    ///
    /// OpenAI and Gemini are registered when a key is available. Ollama is
    /// always registered, pointing at `OLLAMA_HOST` or localhost.
    pub fn from_credentials(store: &CredentialStore, timeout_secs: u64) -> Self {
        let mut registry = Self::new();

        if let Ok(key) = store.get("openai") {
            registry.register(Arc::new(OpenAiProvider::new(key).with_timeout(timeout_secs)));
        }
        if let Ok(key) = store.get("gemini") {
            registry.register(Arc::new(GeminiProvider::new(key).with_timeout(timeout_secs)));
        }
        let ollama = match ollama_host() {
            Some(host) => OllamaProvider::with_base_url(host),
            None => OllamaProvider::new(),
        };
        registry.register(Arc::new(ollama.with_timeout(timeout_secs)));

        info!(backends = ?registry.backends(), "model providers registered");
        registry
    }

    /// Register a provider, replacing any previous one for its backend.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        debug!(provider = provider.name(), "registering provider");
        self.providers.insert(provider.backend(), provider);
    }

    /// Provider for a backend.
    pub fn get(&self, backend: Backend) -> Result<Arc<dyn ModelProvider>> {
        self.providers
            .get(&backend)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(backend.to_string()))
    }

    /// Route a model choice to its provider and bare model name.
    pub fn resolve(&self, model_choice: &str) -> Result<(Arc<dyn ModelProvider>, String)> {
        let (backend, model) = Backend::resolve(model_choice)?;
        Ok((self.get(backend)?, model))
    }

    /// Registered backends, sorted.
    pub fn backends(&self) -> Vec<Backend> {
        let mut backends: Vec<_> = self.providers.keys().copied().collect();
        backends.sort();
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_routes_by_prefix() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(OllamaProvider::new()));

        let (provider, model) = registry.resolve("ollama:qwen2.5:7b").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(model, "qwen2.5:7b");
    }

    #[test]
    fn resolve_fails_for_unregistered_backend() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("gpt-4o-mini").err().unwrap();
        assert!(matches!(err, Error::ProviderNotFound(name) if name == "openai"));
    }

    #[test]
    fn register_replaces_existing_backend() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(OllamaProvider::with_base_url("http://a:1")));
        registry.register(Arc::new(OllamaProvider::with_base_url("http://b:2")));
        assert_eq!(registry.backends(), vec![Backend::Ollama]);
    }

    #[test]
    fn from_credentials_always_has_ollama() {
        let store = CredentialStore::new("test-nanshe-nonexistent");
        let registry = ProviderRegistry::from_credentials(&store, 30);
        assert!(registry.get(Backend::Ollama).is_ok());
    }
}
