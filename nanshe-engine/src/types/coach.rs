//! Coach conversation records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;
use crate::EngineError;

/// Where in the app a coach conversation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "location", rename_all = "lowercase")]
pub enum CoachContext {
    Dashboard,
    Capsule { capsule_id: Id },
    Molecule { capsule_id: Id, molecule_id: Id },
}

impl CoachContext {
    /// Deterministic thread key: `dashboard`, `capsule:{id}`, `molecule:{id}`.
    pub fn location_key(&self) -> String {
        match self {
            CoachContext::Dashboard => "dashboard".to_string(),
            CoachContext::Capsule { capsule_id } => format!("capsule:{capsule_id}"),
            CoachContext::Molecule { molecule_id, .. } => format!("molecule:{molecule_id}"),
        }
    }

    pub fn location(&self) -> &'static str {
        match self {
            CoachContext::Dashboard => "dashboard",
            CoachContext::Capsule { .. } => "capsule",
            CoachContext::Molecule { .. } => "molecule",
        }
    }

    pub fn capsule_id(&self) -> Option<Id> {
        match self {
            CoachContext::Dashboard => None,
            CoachContext::Capsule { capsule_id } | CoachContext::Molecule { capsule_id, .. } => {
                Some(*capsule_id)
            }
        }
    }

    pub fn molecule_id(&self) -> Option<Id> {
        match self {
            CoachContext::Molecule { molecule_id, .. } => Some(*molecule_id),
            _ => None,
        }
    }
}

/// Persisted conversation, unique per `(user, location_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachThread {
    pub id: Id,
    pub user_id: Id,
    pub context: CoachContext,
    pub location_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Author of a coach message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachRole {
    User,
    Coach,
}

impl CoachRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachRole::User => "user",
            CoachRole::Coach => "coach",
        }
    }
}

impl fmt::Display for CoachRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoachRole {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(CoachRole::User),
            "coach" => Ok(CoachRole::Coach),
            other => Err(EngineError::InvalidInput(format!("unknown coach role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachMessage {
    pub id: Id,
    pub thread_id: Id,
    pub role: CoachRole,
    pub content: String,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Stored wallet; the live value is derived by refilling from `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyWallet {
    pub user_id: Id,
    pub current_energy: f64,
    pub updated_at: DateTime<Utc>,
}

/// Wallet state as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyStatus {
    pub current: f64,
    pub max: f64,
    pub seconds_until_next_message: u64,
    pub next_message_available_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_keys() {
        assert_eq!(CoachContext::Dashboard.location_key(), "dashboard");
        assert_eq!(
            CoachContext::Capsule { capsule_id: 7 }.location_key(),
            "capsule:7"
        );
        let ctx = CoachContext::Molecule {
            capsule_id: 7,
            molecule_id: 12,
        };
        assert_eq!(ctx.location_key(), "molecule:12");
        assert_eq!(ctx.capsule_id(), Some(7));
    }

    #[test]
    fn test_context_serializes_with_location_tag() {
        let json = serde_json::to_value(CoachContext::Capsule { capsule_id: 3 }).unwrap();
        assert_eq!(json["location"], "capsule");
        assert_eq!(json["capsule_id"], 3);
    }
}
