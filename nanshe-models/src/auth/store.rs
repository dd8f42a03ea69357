use std::env;

use tracing::debug;

use super::{ApiKey, KEYED_PROVIDERS, env_var_for};
use crate::{Error, Result};

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Keyring,
    Environment,
}

/// Keyring-backed key store, optionally falling back to the environment.
///
/// The keyring always wins over the environment. Writes only ever go to the
/// keyring.
pub struct CredentialStore {
    service_name: String,
    env_fallback: bool,
}

impl CredentialStore {
    /// Store under a keyring service name (`"nanshe"`).
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            env_fallback: false,
        }
    }

    /// Also read `OPENAI_API_KEY` / `GEMINI_API_KEY`.
    pub fn with_env_fallback(mut self) -> Self {
        self.env_fallback = true;
        self
    }

    /// Key for a provider, or `CredentialsNotFound`.
    pub fn get(&self, provider: &str) -> Result<ApiKey> {
        self.lookup(provider)
            .map(|(key, source)| {
                debug!(provider, ?source, "API key resolved");
                key
            })
            .ok_or_else(|| Error::CredentialsNotFound(provider.to_string()))
    }

    /// Where the key for `provider` would come from.
    pub fn credential_source(&self, provider: &str) -> Option<CredentialSource> {
        self.lookup(provider).map(|(_, source)| source)
    }

    pub fn has(&self, provider: &str) -> bool {
        self.lookup(provider).is_some()
    }

    /// Save a key in the keyring. Only keyed backends are accepted.
    pub fn set(&self, provider: &str, key: &str) -> Result<()> {
        if env_var_for(provider).is_none() {
            return Err(Error::UnknownBackend(format!(
                "{provider} does not take an API key"
            )));
        }
        self.entry(provider)?
            .set_password(key)
            .map_err(|e| Error::Keyring(e.to_string()))?;
        debug!(provider, "API key stored in keyring");
        Ok(())
    }

    /// Remove a key from the keyring; the environment is never touched.
    pub fn delete(&self, provider: &str) -> Result<()> {
        self.entry(provider)?
            .delete_credential()
            .map_err(|e| match e {
                keyring::Error::NoEntry => Error::CredentialsNotFound(provider.to_string()),
                other => Error::Keyring(other.to_string()),
            })?;
        debug!(provider, "API key removed from keyring");
        Ok(())
    }

    /// Keyed providers with a usable key, sorted by name.
    pub fn list_providers(&self) -> Vec<String> {
        KEYED_PROVIDERS
            .iter()
            .filter(|(name, _)| self.has(name))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn lookup(&self, provider: &str) -> Option<(ApiKey, CredentialSource)> {
        if let Some(key) = self.keyring_key(provider) {
            return Some((key, CredentialSource::Keyring));
        }
        if !self.env_fallback {
            return None;
        }
        let var = env_var_for(provider)?;
        env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| (ApiKey::new(v.trim()), CredentialSource::Environment))
    }

    fn entry(&self, provider: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name, provider).map_err(|e| Error::Keyring(e.to_string()))
    }

    fn keyring_key(&self, provider: &str) -> Option<ApiKey> {
        self.entry(provider).ok()?.get_password().ok().map(ApiKey::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: &str = "nanshe-test-nonexistent";

    #[test]
    fn environment_fallback_is_opt_in() {
        // SAFETY: only this test touches GEMINI_API_KEY
        unsafe { env::set_var("GEMINI_API_KEY", "  gm-from-env  ") };
        let with = CredentialStore::new(SERVICE).with_env_fallback();
        let key = with.get("gemini").map(|k| k.expose_secret().to_string());
        let source = with.credential_source("gemini");
        let listed = with.list_providers();
        let without = CredentialStore::new(SERVICE).get("gemini");
        // SAFETY: see above
        unsafe { env::remove_var("GEMINI_API_KEY") };

        assert_eq!(key.unwrap(), "gm-from-env");
        assert_eq!(source, Some(CredentialSource::Environment));
        assert!(listed.contains(&"gemini".to_string()));
        assert!(matches!(without, Err(Error::CredentialsNotFound(_))));
    }

    #[test]
    fn keyless_backends_cannot_store_keys() {
        let store = CredentialStore::new(SERVICE);
        assert!(matches!(store.set("ollama", "x"), Err(Error::UnknownBackend(_))));
    }

    #[test]
    fn unknown_provider_has_no_source() {
        let store = CredentialStore::new(SERVICE).with_env_fallback();
        assert_eq!(store.credential_source("anthropic"), None);
    }
}
