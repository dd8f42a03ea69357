//! Programming recipes with stage-based difficulty.

use async_trait::async_trait;

use super::{DomainBuilder, MoleculeContext, RecipeStep, contains_any};
use crate::types::ContentType;

const DOMAINS: &[&str] = &[
    "programming",
    "programmation",
    "coding",
    "software",
    "développement",
    "developpement",
    "development",
    "informatique",
];

/// Where a molecule sits in the course, by quarter of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Foundation,
    Consolidation,
    Application,
    Mastery,
}

impl Stage {
    /// Stage of the molecule at `index` (zero-based) among `total`
    pub fn at(index: usize, total: usize) -> Self {
        let total = total.max(1);
        match (index.min(total - 1) * 4) / total {
            0 => Stage::Foundation,
            1 => Stage::Consolidation,
            2 => Stage::Application,
            _ => Stage::Mastery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Foundation => "foundation",
            Stage::Consolidation => "consolidation",
            Stage::Application => "application",
            Stage::Mastery => "mastery",
        }
    }

    /// Difficulty label for challenges and projects
    pub fn difficulty(&self) -> &'static str {
        match self {
            Stage::Foundation => "facile",
            Stage::Consolidation | Stage::Application => "moyen",
            Stage::Mastery => "difficile",
        }
    }
}

pub struct ProgrammingBuilder;

impl ProgrammingBuilder {
    fn stage_of(ctx: &MoleculeContext<'_>) -> Stage {
        Stage::at(ctx.flat_index(), ctx.total_molecules())
    }
}

#[async_trait]
impl DomainBuilder for ProgrammingBuilder {
    fn name(&self) -> &'static str {
        "programming"
    }

    fn handles(&self, domain: &str, area: &str) -> bool {
        contains_any(domain, DOMAINS) || contains_any(area, DOMAINS)
    }

    fn stage(&self, ctx: &MoleculeContext<'_>) -> Option<&'static str> {
        Some(Self::stage_of(ctx).as_str())
    }

    fn recipe(&self, ctx: &MoleculeContext<'_>) -> Vec<RecipeStep> {
        let difficulty = Self::stage_of(ctx).difficulty();
        vec![
            RecipeStep::new(ContentType::Lesson),
            RecipeStep::new(ContentType::CodeExample),
            RecipeStep::new(ContentType::Quiz).difficulty("moyen"),
            RecipeStep::new(ContentType::LiveCodeExecutor),
            RecipeStep::new(ContentType::CodeChallenge).difficulty(difficulty),
            RecipeStep::new(ContentType::CodeSandboxSetup).difficulty(difficulty),
            RecipeStep::new(ContentType::CodeProjectBrief).difficulty(difficulty),
        ]
    }
}
