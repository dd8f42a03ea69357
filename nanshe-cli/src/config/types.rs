use std::path::PathBuf;

use nanshe_engine::config::StorageEngine;
use nanshe_models::PricingTable;
use serde::Deserialize;

/// Raw config as read from one TOML layer; unset keys stay `None`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNansheConfig {
    pub embedding: RawEmbeddingConfig,
    pub xp: RawXpConfig,
    pub coach: RawCoachConfig,
    pub classifier: RawClassifierConfig,
    pub llm: RawLlmConfig,
    pub storage: RawStorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEmbeddingConfig {
    pub dimension: Option<usize>,
    pub use_remote: Option<bool>,
    pub cache_capacity: Option<usize>,
    pub remote_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawXpConfig {
    pub total_per_capsule: Option<u64>,
    pub bonus_budget_per_molecule: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCoachConfig {
    pub energy_max: Option<f64>,
    pub recovery_minutes: Option<f64>,
    pub message_cost: Option<f64>,
    pub history_round_trips: Option<usize>,
    pub context_chunks: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawClassifierConfig {
    pub threshold: Option<f32>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLlmConfig {
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    /// Per-model overrides; layers add to each other
    pub pricing: Option<PricingTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStorageConfig {
    pub db_path: Option<PathBuf>,
    pub engine: Option<StorageEngine>,
}
