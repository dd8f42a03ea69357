//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nanshe_engine::config::{EngineConfig, StorageConfig};
use nanshe_engine::progress::LoggingBadgeAwarder;
use nanshe_engine::{CozoStore, Engine, SubscriptionTier, User};
use nanshe_models::providers::{Backend, ChatRequest, ChatResponse, StopReason, Usage};
use nanshe_models::{ModelProvider, ProviderRegistry};
use serde_json::{Value, json};

/// Marker present in the planner's system prompts.
pub const PLAN_PROMPT: &str = "curriculum designer";
/// Marker present in the coach's system prompt.
pub const COACH_PROMPT: &str = "learning coach";

/// Provider answering by the first rule whose needle appears in the
/// system prompt; unmatched requests fail.
pub struct ScriptedProvider {
    rules: Mutex<Vec<(String, String)>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn answer(&self, needle: &str, reply: Value) {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), reply.to_string()));
    }

    /// Number of requests whose system prompt contained `needle`
    pub fn calls(&self, needle: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    /// System prompts of the requests that contained `needle`, in order
    pub fn prompts(&self, needle: &str) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn backend(&self) -> Backend {
        Backend::OpenAi
    }

    async fn chat(&self, request: ChatRequest) -> nanshe_models::Result<ChatResponse> {
        let system = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.seen.lock().unwrap().push(system.clone());
        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| system.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        match reply {
            Some(content) => Ok(ChatResponse {
                content,
                stop_reason: StopReason::EndTurn,
                usage: Usage::new(50, 10),
            }),
            None => Err(nanshe_models::Error::ProviderApi("no scripted reply".into())),
        }
    }
}

/// In-memory engine over the scripted provider, one attempt per call
pub async fn engine(provider: Arc<ScriptedProvider>) -> Engine {
    let mut config = EngineConfig::default();
    config.storage = StorageConfig::in_memory();
    config.llm.max_retries = 0;
    config.llm.model = "openai:test-model".into();
    let mut registry = ProviderRegistry::new();
    registry.register(provider);
    let store = Arc::new(CozoStore::open_mem().await.unwrap());
    Engine::with_store(config, registry, store, Arc::new(LoggingBadgeAwarder))
}

pub async fn user(engine: &Engine, id: i64, tier: SubscriptionTier) -> User {
    let user = User::new(id, format!("user{id}@example.com")).with_tier(tier);
    engine.store.upsert_user(&user).await.unwrap();
    user
}

/// Plan with `levels` levels of `chapters` chapters each
pub fn plan_json(levels: usize, chapters: usize) -> Value {
    let levels: Vec<Value> = (1..=levels)
        .map(|l| {
            json!({
                "level_title": format!("Level {l}"),
                "chapters": (1..=chapters)
                    .map(|c| json!({"chapter_title": format!("Chapter {l}.{c}")}))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    json!({"overview": "A complete course", "levels": levels})
}
