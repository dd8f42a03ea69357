//! Capsule → Granule → Molecule → Atom tree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentType, Id, LearningPlan};
use crate::EngineError;
use crate::content::AtomContent;

/// Generation lifecycle of a capsule or molecule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    /// Completed and failed are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GenerationStatus::Pending),
            "generating" => Ok(GenerationStatus::Generating),
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(EngineError::InvalidInput(format!(
                "unknown generation status: {other}"
            ))),
        }
    }
}

/// Taxonomy placement of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub domain: String,
    pub area: String,
    pub main_skill: String,
}

impl Classification {
    pub fn new(
        domain: impl Into<String>,
        area: impl Into<String>,
        main_skill: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            area: area.into(),
            main_skill: main_skill.into(),
        }
    }
}

/// A generated course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub id: Id,
    pub title: String,
    pub domain: String,
    pub area: String,
    pub main_skill: String,
    pub creator_id: Id,
    pub is_public: bool,
    /// Target language of the learner (ISO code), if any
    pub language: Option<String>,
    pub learning_plan: Option<LearningPlan>,
    pub generation_status: GenerationStatus,
    pub created_at: DateTime<Utc>,
}

impl Capsule {
    pub fn classification(&self) -> Classification {
        Classification::new(&self.domain, &self.area, &self.main_skill)
    }

    /// The plan, or `NotFound` when it has not been generated yet.
    pub fn plan(&self) -> crate::Result<&LearningPlan> {
        self.learning_plan
            .as_ref()
            .ok_or_else(|| EngineError::not_found("learning plan", self.id))
    }
}

/// Ordered section of a capsule, materialized from one plan level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Granule {
    pub id: Id,
    pub capsule_id: Id,
    /// 1-based
    pub order: u32,
    pub title: String,
}

/// Ordered lesson inside a granule, materialized from one plan chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    pub id: Id,
    pub granule_id: Id,
    /// 1-based
    pub order: u32,
    pub title: String,
    pub generation_status: GenerationStatus,
}

/// One content block of a molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub id: Id,
    pub molecule_id: Id,
    pub title: String,
    /// 1-based, contiguous within the molecule
    pub order: u32,
    pub content_type: ContentType,
    pub content: AtomContent,
    pub difficulty: Option<String>,
    pub is_bonus: bool,
    pub created_at: DateTime<Utc>,
}

/// An atom not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAtom {
    pub title: String,
    pub content: AtomContent,
    pub difficulty: Option<String>,
    pub is_bonus: bool,
}

impl NewAtom {
    pub fn core(title: impl Into<String>, content: AtomContent) -> Self {
        Self {
            title: title.into(),
            content,
            difficulty: None,
            is_bonus: false,
        }
    }

    pub fn bonus(title: impl Into<String>, content: AtomContent) -> Self {
        Self {
            is_bonus: true,
            ..Self::core(title, content)
        }
    }

    pub fn with_difficulty(mut self, difficulty: Option<String>) -> Self {
        self.difficulty = difficulty;
        self
    }
}

/// Position of an atom in a molecule after a rebuild: either an existing
/// row (kept with its id) or a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomSlot {
    Existing(Atom),
    New(NewAtom),
}

impl AtomSlot {
    pub fn content_type(&self) -> ContentType {
        match self {
            AtomSlot::Existing(atom) => atom.content_type,
            AtomSlot::New(atom) => atom.content.content_type(),
        }
    }

    pub fn content(&self) -> &AtomContent {
        match self {
            AtomSlot::Existing(atom) => &atom.content,
            AtomSlot::New(atom) => &atom.content,
        }
    }
}

/// An atom with its ancestors, loaded together.
#[derive(Debug, Clone)]
pub struct AtomLineage {
    pub atom: Atom,
    pub molecule: Molecule,
    pub granule: Granule,
    pub capsule: Capsule,
}

/// User ↔ capsule link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: Id,
    pub capsule_id: Id,
    pub enrolled_at: DateTime<Utc>,
}
