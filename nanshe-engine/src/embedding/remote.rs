//! Embeddings from a model provider, projected to the engine dimension.

use std::sync::Arc;

use async_trait::async_trait;
use nanshe_models::ModelProvider;
use nanshe_models::providers::EmbedRequest;

use super::{Embedder, project};
use crate::{EngineError, Result};

pub struct RemoteEmbedder {
    provider: Arc<dyn ModelProvider>,
    model: String,
    dimension: usize,
}

impl RemoteEmbedder {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let response = self
            .provider
            .embed(EmbedRequest::new(&self.model, vec![text.to_string()]))
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;
        let raw = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embedding("provider returned no embedding".into()))?;
        if raw.iter().any(|x| !x.is_finite()) {
            return Err(EngineError::Embedding("provider returned non-finite values".into()));
        }
        Ok(project(&raw, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
