//! API keys for the hosted backends.
//!
//! Keys live in the system keyring under one service name; the environment
//! (`OPENAI_API_KEY`, `GEMINI_API_KEY`) is consulted as a read-only fallback
//! for CI and containers. Ollama needs no key, only a host.

mod store;

use std::env;

use secrecy::{ExposeSecret, SecretString};

pub use store::{CredentialSource, CredentialStore};

/// Environment variable holding the Ollama server URL.
pub const OLLAMA_HOST_VAR: &str = "OLLAMA_HOST";

/// Backends that authenticate with a key, and where the environment keeps it.
pub(crate) const KEYED_PROVIDERS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
];

pub(crate) fn env_var_for(provider: &str) -> Option<&'static str> {
    KEYED_PROVIDERS
        .iter()
        .find_map(|(name, var)| (*name == provider).then_some(*var))
}

/// Secret key; `Debug` never prints it.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Raw value, for request headers only.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ollama base URL from `OLLAMA_HOST`.
///
/// Bare `host:port` values get an `http://` scheme; a trailing slash is
/// dropped so endpoint paths can be appended directly.
pub fn ollama_host() -> Option<String> {
    normalize_host(&env::var(OLLAMA_HOST_VAR).ok()?)
}

fn normalize_host(raw: &str) -> Option<String> {
    let host = raw.trim().trim_end_matches('/');
    if host.is_empty() {
        None
    } else if host.starts_with("http://") || host.starts_with("https://") {
        Some(host.to_string())
    } else {
        Some(format!("http://{host}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted_in_debug() {
        let key = ApiKey::new("sk-live-abcdef");
        let shown = format!("{key:?}");
        assert_eq!(shown, "ApiKey([REDACTED])");
        assert!(!shown.contains("sk-live"));
        assert_eq!(key.expose_secret(), "sk-live-abcdef");
    }

    #[test]
    fn only_hosted_backends_have_key_variables() {
        assert_eq!(env_var_for("openai"), Some("OPENAI_API_KEY"));
        assert_eq!(env_var_for("gemini"), Some("GEMINI_API_KEY"));
        assert_eq!(env_var_for("ollama"), None);
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("10.0.0.5:11434").as_deref(), Some("http://10.0.0.5:11434"));
        assert_eq!(
            normalize_host(" https://gpu.internal:11434/ ").as_deref(),
            Some("https://gpu.internal:11434")
        );
        assert_eq!(normalize_host("   "), None);
    }
}
