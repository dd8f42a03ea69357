use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nanshe_engine::EngineConfig;

use super::types::{
    RawClassifierConfig, RawCoachConfig, RawEmbeddingConfig, RawLlmConfig, RawNansheConfig,
    RawStorageConfig, RawXpConfig,
};

pub const ENV_PROJECT_CONFIG_DIR: &str = "NANSHE_PROJECT_CONFIG_DIR";
pub const ENV_USE_REMOTE_EMBEDDINGS: &str = "NANSHE_USE_REMOTE_EMBEDDINGS";
pub const ENV_EMBEDDING_DIMENSION: &str = "NANSHE_EMBEDDING_DIMENSION";
pub const ENV_LLM_MODEL: &str = "NANSHE_LLM_MODEL";

/// Every variable the loader reads
pub const ENV_OVERRIDES: [&str; 4] = [
    ENV_PROJECT_CONFIG_DIR,
    ENV_USE_REMOTE_EMBEDDINGS,
    ENV_EMBEDDING_DIMENSION,
    ENV_LLM_MODEL,
];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (defaults, user, project, environment)
    pub fn load() -> Result<EngineConfig> {
        let mut raw = RawNansheConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if user_path.exists() {
            raw = Self::merge_raw(raw, Self::read_layer(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_layer(&project_path)?);
        }

        // Layer 3: Environment
        raw = Self::apply_env(raw, |key| std::env::var(key).ok())?;

        Ok(Self::finalize(raw))
    }

    /// User config path under the XDG config directory
    pub fn user_config_path() -> PathBuf {
        nanshe_paths::config_dir().join("config.toml")
    }

    /// Project config path
    /// Can be overridden with NANSHE_PROJECT_CONFIG_DIR (isolated runs and tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_PROJECT_CONFIG_DIR) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".nanshe/config.toml")
        }
    }

    fn read_layer(path: &Path) -> Result<RawNansheConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Overlay values win where they are set
    fn merge_raw(base: RawNansheConfig, overlay: RawNansheConfig) -> RawNansheConfig {
        RawNansheConfig {
            embedding: RawEmbeddingConfig {
                dimension: overlay.embedding.dimension.or(base.embedding.dimension),
                use_remote: overlay.embedding.use_remote.or(base.embedding.use_remote),
                cache_capacity: overlay.embedding.cache_capacity.or(base.embedding.cache_capacity),
                remote_model: overlay.embedding.remote_model.or(base.embedding.remote_model),
            },
            xp: RawXpConfig {
                total_per_capsule: overlay.xp.total_per_capsule.or(base.xp.total_per_capsule),
                bonus_budget_per_molecule: overlay
                    .xp
                    .bonus_budget_per_molecule
                    .or(base.xp.bonus_budget_per_molecule),
            },
            coach: RawCoachConfig {
                energy_max: overlay.coach.energy_max.or(base.coach.energy_max),
                recovery_minutes: overlay.coach.recovery_minutes.or(base.coach.recovery_minutes),
                message_cost: overlay.coach.message_cost.or(base.coach.message_cost),
                history_round_trips: overlay
                    .coach
                    .history_round_trips
                    .or(base.coach.history_round_trips),
                context_chunks: overlay.coach.context_chunks.or(base.coach.context_chunks),
            },
            classifier: RawClassifierConfig {
                threshold: overlay.classifier.threshold.or(base.classifier.threshold),
                top_k: overlay.classifier.top_k.or(base.classifier.top_k),
            },
            llm: RawLlmConfig {
                model: overlay.llm.model.or(base.llm.model),
                timeout_seconds: overlay.llm.timeout_seconds.or(base.llm.timeout_seconds),
                max_retries: overlay.llm.max_retries.or(base.llm.max_retries),
                pricing: match (base.llm.pricing, overlay.llm.pricing) {
                    (Some(mut table), Some(more)) => {
                        table.extend(more);
                        Some(table)
                    }
                    (base, overlay) => overlay.or(base),
                },
            },
            storage: RawStorageConfig {
                db_path: overlay.storage.db_path.or(base.storage.db_path),
                engine: overlay.storage.engine.or(base.storage.engine),
            },
        }
    }

    /// Apply the NANSHE_* environment overrides read through `lookup`
    pub fn apply_env(
        mut raw: RawNansheConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<RawNansheConfig> {
        if let Some(value) = lookup(ENV_USE_REMOTE_EMBEDDINGS) {
            raw.embedding.use_remote = Some(parse_bool(&value).with_context(|| {
                format!("{ENV_USE_REMOTE_EMBEDDINGS} must be a boolean, got '{value}'")
            })?);
        }
        if let Some(value) = lookup(ENV_EMBEDDING_DIMENSION) {
            let dimension: usize = value.trim().parse().with_context(|| {
                format!("{ENV_EMBEDDING_DIMENSION} must be a positive integer, got '{value}'")
            })?;
            anyhow::ensure!(dimension > 0, "{ENV_EMBEDDING_DIMENSION} must be positive");
            raw.embedding.dimension = Some(dimension);
        }
        if let Some(value) = lookup(ENV_LLM_MODEL)
            && !value.trim().is_empty()
        {
            raw.llm.model = Some(value.trim().to_string());
        }
        Ok(raw)
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawNansheConfig) -> EngineConfig {
        let mut config = EngineConfig::default();

        let embedding = &mut config.embedding;
        if let Some(v) = raw.embedding.dimension {
            embedding.dimension = v;
        }
        if let Some(v) = raw.embedding.use_remote {
            embedding.use_remote = v;
        }
        if let Some(v) = raw.embedding.cache_capacity {
            embedding.cache_capacity = v;
        }
        if let Some(v) = raw.embedding.remote_model {
            embedding.remote_model = v;
        }

        if let Some(v) = raw.xp.total_per_capsule {
            config.xp.total_per_capsule = v;
        }
        if let Some(v) = raw.xp.bonus_budget_per_molecule {
            config.xp.bonus_budget_per_molecule = v;
        }

        let coach = &mut config.coach;
        if let Some(v) = raw.coach.energy_max {
            coach.energy_max = v;
        }
        if let Some(v) = raw.coach.recovery_minutes {
            coach.recovery_minutes = v;
        }
        if let Some(v) = raw.coach.message_cost {
            coach.message_cost = v;
        }
        if let Some(v) = raw.coach.history_round_trips {
            coach.history_round_trips = v;
        }
        if let Some(v) = raw.coach.context_chunks {
            coach.context_chunks = v;
        }

        if let Some(v) = raw.classifier.threshold {
            config.classifier.threshold = v;
        }
        if let Some(v) = raw.classifier.top_k {
            config.classifier.top_k = v;
        }

        let llm = &mut config.llm;
        if let Some(v) = raw.llm.model {
            llm.model = v;
        }
        if let Some(v) = raw.llm.timeout_seconds {
            llm.timeout_seconds = v;
        }
        if let Some(v) = raw.llm.max_retries {
            llm.max_retries = v;
        }
        if let Some(v) = raw.llm.pricing {
            llm.pricing = v;
        }

        if let Some(v) = raw.storage.db_path {
            config.storage.db_path = v;
        }
        if let Some(v) = raw.storage.engine {
            config.storage.engine = v;
        }
        config
    }

    /// Load a single file on top of the defaults, environment ignored
    pub fn load_file(path: &Path) -> Result<EngineConfig> {
        Ok(Self::finalize(Self::read_layer(path)?))
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanshe_engine::config::StorageEngine;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn raw(toml: &str) -> RawNansheConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_empty_layers_give_engine_defaults() {
        let config = ConfigLoader::finalize(RawNansheConfig::default());
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_project_layer_overrides_user_layer() {
        let user = raw(
            r#"
            [coach]
            message_cost = 10.0
            energy_max = 50.0

            [llm]
            model = "ollama:llama3"
            "#,
        );
        let project = raw(
            r#"
            [coach]
            message_cost = 5.0

            [storage]
            engine = "mem"
            "#,
        );
        let config = ConfigLoader::finalize(ConfigLoader::merge_raw(user, project));
        assert!((config.coach.message_cost - 5.0).abs() < f64::EPSILON);
        assert!((config.coach.energy_max - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.llm.model, "ollama:llama3");
        assert_eq!(config.storage.engine, StorageEngine::Mem);
        assert_eq!(config.classifier.top_k, 1);
    }

    #[test]
    fn test_pricing_layers_accumulate() {
        let user = raw(
            r#"
            [llm.pricing.model-a]
            input_per_million = 1.0
            output_per_million = 2.0
            "#,
        );
        let project = raw(
            r#"
            [llm.pricing.model-b]
            input_per_million = 3.0
            output_per_million = 4.0
            "#,
        );
        let config = ConfigLoader::finalize(ConfigLoader::merge_raw(user, project));
        let table = config.llm.pricing_table();
        assert!(table.get("model-a").is_some());
        assert!(table.get("model-b").is_some());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_USE_REMOTE_EMBEDDINGS, "yes"),
            (ENV_EMBEDDING_DIMENSION, "768"),
            (ENV_LLM_MODEL, "gemini:gemini-1.5-flash"),
        ]
        .into_iter()
        .collect();
        let raw = ConfigLoader::apply_env(RawNansheConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();
        let config = ConfigLoader::finalize(raw);
        assert!(config.embedding.use_remote);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.llm.model, "gemini:gemini-1.5-flash");
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        let result = ConfigLoader::apply_env(RawNansheConfig::default(), |k| {
            (k == ENV_EMBEDDING_DIMENSION).then(|| "wide".to_string())
        });
        assert!(result.is_err());
        let result = ConfigLoader::apply_env(RawNansheConfig::default(), |k| {
            (k == ENV_USE_REMOTE_EMBEDDINGS).then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[xp]\ntotal_per_capsule = 1000\n").unwrap();
        let config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(config.xp.total_per_capsule, 1000);
        assert_eq!(config.xp.bonus_budget_per_molecule, 50);
    }

    #[test]
    #[serial]
    fn test_project_config_path_env_override() {
        let dir = TempDir::new().unwrap();
        unsafe {
            std::env::set_var(ENV_PROJECT_CONFIG_DIR, dir.path());
        }
        assert_eq!(
            ConfigLoader::project_config_path(),
            dir.path().join("config.toml")
        );
        unsafe {
            std::env::remove_var(ENV_PROJECT_CONFIG_DIR);
        }
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".nanshe/config.toml")
        );
    }
}
