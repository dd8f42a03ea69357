//! Error types for nanshe-engine

use thiserror::Error;

use crate::types::EnergyStatus;

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller passed empty or malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("capsule", "molecule", ...)
        kind: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Operation requires a premium subscription
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Coach wallet cannot pay for another message yet
    #[error("Coach energy depleted, next message in {}s", .0.seconds_until_next_message)]
    CoachEnergyDepleted(EnergyStatus),

    /// Language model call or response parsing failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Requested plan position does not exist
    #[error("Plan has no molecule at granule {granule}, molecule {molecule}")]
    PlanIndexOutOfRange {
        /// 1-based granule order
        granule: u32,
        /// 1-based molecule order
        molecule: u32,
    },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Schema migration failed
    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Background generation queue no longer accepts tasks
    #[error("Generation queue is closed")]
    QueueClosed,

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for [`EngineError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<nanshe_models::Error> for EngineError {
    fn from(err: nanshe_models::Error) -> Self {
        Self::Llm(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_display() {
        let err = EngineError::Database("connection failed".into());
        assert!(err.to_string().contains("connection failed"));
    }

    #[test]
    fn test_not_found_display() {
        let err = EngineError::not_found("capsule", 42);
        assert_eq!(err.to_string(), "capsule not found: 42");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_provider_errors_map_to_llm() {
        let err: EngineError = nanshe_models::Error::Timeout(90).into();
        assert!(matches!(err, EngineError::Llm(msg) if msg.contains("90")));
    }

    #[test]
    fn test_energy_depleted_mentions_wait() {
        let status = EnergyStatus {
            current: 0.0,
            max: 100.0,
            seconds_until_next_message: 900,
            next_message_available_at: Utc::now(),
        };
        let err = EngineError::CoachEnergyDepleted(status);
        assert!(err.to_string().contains("900s"));
    }
}
