//! Engine configuration.
//!
//! Every section carries `#[serde(default)]`, so a TOML file only needs the
//! keys it wants to change.

use std::path::PathBuf;
use std::str::FromStr;

use nanshe_models::PricingTable;
use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Default embedding dimensionality (384-class sentence embeddings).
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Fixed XP budget distributed across the core atoms of a capsule.
pub const TOTAL_XP_PER_CAPSULE: u64 = 60_000;

/// Separate XP pool shared by the bonus atoms of one molecule.
pub const BONUS_BUDGET_PER_MOLECULE: u64 = 50;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Embedding service settings
    pub embedding: EmbeddingConfig,
    /// XP budgets
    pub xp: XpConfig,
    /// Coach energy and context settings
    pub coach: CoachConfig,
    /// Taxonomy classifier settings
    pub classifier: ClassifierConfig,
    /// Language model gateway settings
    pub llm: LlmConfig,
    /// Database location and engine
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Process-wide vector dimensionality
    pub dimension: usize,
    /// Call the remote embedding backend before the hashed fallback
    pub use_remote: bool,
    /// Number of cached embeddings
    pub cache_capacity: usize,
    /// Model id for the remote backend (`provider:model`)
    pub remote_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            use_remote: false,
            cache_capacity: 1024,
            remote_model: "openai:text-embedding-3-small".to_string(),
        }
    }
}

/// XP budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpConfig {
    /// Core XP per capsule
    pub total_per_capsule: u64,
    /// Bonus XP per molecule
    pub bonus_budget_per_molecule: u64,
}

impl Default for XpConfig {
    fn default() -> Self {
        Self {
            total_per_capsule: TOTAL_XP_PER_CAPSULE,
            bonus_budget_per_molecule: BONUS_BUDGET_PER_MOLECULE,
        }
    }
}

/// Coach settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Wallet capacity
    pub energy_max: f64,
    /// Minutes to refill an empty wallet
    pub recovery_minutes: f64,
    /// Energy charged per message
    pub message_cost: f64,
    /// Round-trips kept verbatim before older history is summarized
    pub history_round_trips: usize,
    /// Vector store chunks injected as context
    pub context_chunks: usize,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            energy_max: 100.0,
            recovery_minutes: 60.0,
            message_cost: 25.0,
            history_round_trips: 3,
            context_chunks: 3,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum cosine similarity for a match
    pub threshold: f32,
    /// Maximum matches returned
    pub top_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            top_k: 1,
        }
    }
}

/// Language model gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Default model id (`provider:model`)
    pub model: String,
    /// Per-request deadline
    pub timeout_seconds: u64,
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Price overrides merged over the built-in table
    pub pricing: PricingTable,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "openai:gpt-4o-mini".to_string(),
            timeout_seconds: 90,
            max_retries: 2,
            pricing: PricingTable::empty(),
        }
    }
}

impl LlmConfig {
    /// Built-in prices with configured overrides applied.
    pub fn pricing_table(&self) -> PricingTable {
        let mut table = PricingTable::default();
        table.extend(self.pricing.clone());
        table
    }
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// On-disk RocksDB
    #[default]
    Rocksdb,
    /// In-memory, lost on exit
    Mem,
}

impl StorageEngine {
    /// Name understood by `cozo::DbInstance::new`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEngine::Rocksdb => "rocksdb",
            StorageEngine::Mem => "mem",
        }
    }
}

impl FromStr for StorageEngine {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rocksdb" => Ok(StorageEngine::Rocksdb),
            "mem" => Ok(StorageEngine::Mem),
            other => Err(EngineError::InvalidInput(format!(
                "unknown storage engine: {other}"
            ))),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database directory
    pub db_path: PathBuf,
    /// Backend
    pub engine: StorageEngine,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: nanshe_paths::default_db_path(),
            engine: StorageEngine::Rocksdb,
        }
    }
}

impl StorageConfig {
    /// In-memory storage, used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::new(),
            engine: StorageEngine::Mem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding.dimension, 384);
        assert!(!config.embedding.use_remote);
        assert_eq!(config.xp.total_per_capsule, 60_000);
        assert_eq!(config.xp.bonus_budget_per_molecule, 50);
        assert_eq!(config.classifier.top_k, 1);
        assert_eq!(config.llm.max_retries, 2);
        assert!(config.storage.db_path.to_string_lossy().contains("nanshe"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [coach]
            message_cost = 10.0

            [storage]
            engine = "mem"
            "#,
        )
        .unwrap();
        assert!((config.coach.message_cost - 10.0).abs() < f64::EPSILON);
        assert!((config.coach.energy_max - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.storage.engine, StorageEngine::Mem);
        assert_eq!(config.llm.model, "openai:gpt-4o-mini");
    }

    #[test]
    fn test_pricing_overrides_merge() {
        let config = EngineConfig::from_toml_str(
            r#"
            [llm.pricing.my-model]
            input_per_million = 1.0
            output_per_million = 2.0
            "#,
        )
        .unwrap();
        let table = config.llm.pricing_table();
        assert!(table.get("my-model").is_some());
        assert!(table.get("gpt-4o-mini").is_some());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = EngineConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed = EngineConfig::from_toml_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_storage_engine_from_str() {
        assert_eq!("mem".parse::<StorageEngine>().unwrap(), StorageEngine::Mem);
        assert!("sqlite".parse::<StorageEngine>().is_err());
    }
}
