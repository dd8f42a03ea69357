pub mod auth;
pub mod capsule;
pub mod coach;
pub mod config;
pub mod progress;
pub mod taxonomy;
pub mod user;

use anyhow::{Context, Result};
use nanshe_engine::Engine;
use nanshe_models::ProviderRegistry;
use nanshe_models::auth::CredentialStore;
use serde::Serialize;
use tracing::debug;

use crate::config::ConfigLoader;

/// Keyring service name for provider credentials
pub const CREDENTIAL_SERVICE: &str = "nanshe";

/// Load the merged configuration and open every engine service.
pub async fn open_engine() -> Result<Engine> {
    let config = ConfigLoader::load()?;
    debug!(db_path = ?config.storage.db_path, engine = config.storage.engine.as_str(), "Opening store");
    let credentials = CredentialStore::new(CREDENTIAL_SERVICE).with_env_fallback();
    let registry = ProviderRegistry::from_credentials(&credentials, config.llm.timeout_seconds);
    Engine::open(config, registry)
        .await
        .context("failed to open the nanshe database")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
