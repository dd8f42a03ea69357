//! Learner progress records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;
use crate::EngineError;

/// XP earned by a user in one capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleProgress {
    pub user_id: Id,
    pub capsule_id: Id,
    pub skill: String,
    /// Core XP, never above the capsule budget
    pub xp: u64,
    pub bonus_xp: u64,
}

/// Completion state of an atom for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl AtomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomStatus::NotStarted => "not_started",
            AtomStatus::InProgress => "in_progress",
            AtomStatus::Completed => "completed",
        }
    }
}

impl FromStr for AtomStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(AtomStatus::NotStarted),
            "in_progress" => Ok(AtomStatus::InProgress),
            "completed" => Ok(AtomStatus::Completed),
            other => Err(EngineError::InvalidInput(format!("unknown atom status: {other}"))),
        }
    }
}

/// Per-user state of one atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomProgress {
    pub user_id: Id,
    pub atom_id: Id,
    pub status: AtomStatus,
    /// XP for this atom has been credited to the capsule progress
    pub xp_awarded: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub reset_count: u32,
}

impl AtomProgress {
    pub fn new(user_id: Id, atom_id: Id) -> Self {
        Self {
            user_id,
            atom_id,
            status: AtomStatus::NotStarted,
            xp_awarded: false,
            completed_at: None,
            reset_count: 0,
        }
    }
}

/// Outcome of the last review of a molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Success,
    Error,
    Reset,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Success => "success",
            ReviewOutcome::Error => "error",
            ReviewOutcome::Reset => "reset",
        }
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewOutcome {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ReviewOutcome::Success),
            "error" => Ok(ReviewOutcome::Error),
            "reset" => Ok(ReviewOutcome::Reset),
            other => Err(EngineError::InvalidInput(format!(
                "unknown review outcome: {other}"
            ))),
        }
    }
}

/// Spaced-repetition state of a molecule for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeReview {
    pub user_id: Id,
    pub molecule_id: Id,
    pub next_review_at: DateTime<Utc>,
    pub last_review_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Fractional days (8h = 1/3)
    pub interval_days: f64,
    pub ease_factor: f64,
    pub streak: u32,
    pub review_count: u32,
    pub success_count: u32,
    pub total_errors: u32,
    pub total_resets: u32,
    pub last_outcome: Option<ReviewOutcome>,
}

/// An answer submitted for an atom. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerLog {
    pub id: Id,
    pub user_id: Id,
    pub atom_id: Id,
    pub is_correct: bool,
    pub submitted_payload: Value,
    pub created_at: DateTime<Utc>,
}

/// A study session interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: Id,
    pub user_id: Id,
    pub capsule_id: Option<Id>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}
