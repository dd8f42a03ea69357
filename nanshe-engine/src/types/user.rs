//! Users and skills.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;
use crate::EngineError;

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// No paid features
    #[default]
    Free,
    /// Paid, unlocks bonus atoms, source capsules and unlimited coach
    Premium,
    /// Subscription ended
    Canceled,
}

impl SubscriptionTier {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "premium" => Ok(SubscriptionTier::Premium),
            "canceled" => Ok(SubscriptionTier::Canceled),
            other => Err(EngineError::InvalidInput(format!(
                "unknown subscription tier: {other}"
            ))),
        }
    }
}

/// A learner account, as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub tier: SubscriptionTier,
    pub is_superuser: bool,
    /// Lifetime XP, core and bonus
    pub xp: u64,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a free account.
    pub fn new(id: Id, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            tier: SubscriptionTier::Free,
            is_superuser: false,
            xp: 0,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    /// Set the subscription tier.
    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn is_premium(&self) -> bool {
        self.tier == SubscriptionTier::Premium
    }

    /// Premium and staff accounts never pay coach energy.
    pub fn has_unlimited_coach(&self) -> bool {
        self.is_premium() || self.is_superuser
    }
}

/// A taxonomy skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Stable identifier, used as the `main_skill` of capsules
    pub code: String,
    /// Display name, embedded for classification
    pub name: String,
    /// Grouping inside the area
    #[serde(default)]
    pub unit: Option<String>,
    /// Free-form kind ("language", "framework", ...)
    #[serde(default)]
    pub kind: Option<String>,
}

impl Skill {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            unit: None,
            kind: None,
        }
    }
}
