//! Provider errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a provider call or credential lookup can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// Backend known, but nothing registered for it (no key configured)
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Model id prefix does not name a known backend.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("credentials not found for provider: {0}")]
    CredentialsNotFound(String),

    #[error("keyring error: {0}")]
    Keyring(String),

    /// Non-success HTTP status; carries the status and body
    #[error("provider API error: {0}")]
    ProviderApi(String),

    /// Provider answered but the body was not usable.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Transport failure
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Map a transport error, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else {
            Self::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_provider() {
        assert_eq!(
            Error::ProviderNotFound("gemini".into()).to_string(),
            "provider not found: gemini"
        );
        assert_eq!(
            Error::Timeout(90).to_string(),
            "request timed out after 90 seconds"
        );
    }

    #[test]
    fn json_errors_convert() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
