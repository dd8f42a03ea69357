//! Capsule builders
//!
//! A [`DomainBuilder`] decides which atoms a molecule gets (its recipe) and
//! how each one is produced. [`BuilderRegistry`] picks the builder for a
//! capsule's `(domain, area)`, and [`CapsuleBuilder`] drives the shared
//! materialization steps.

mod capsule;
mod default;
mod language;
mod programming;
mod science;

pub use capsule::CapsuleBuilder;
pub use default::DefaultBuilder;
pub use language::LanguageBuilder;
pub use programming::{ProgrammingBuilder, Stage};
pub use science::ScienceBuilder;

use std::sync::Arc;

use async_trait::async_trait;

use crate::atoms::{AtomFactory, AtomRequest};
use crate::content::AtomContent;
use crate::types::{Capsule, ContentType, Granule, LearningPlan, Molecule};

/// One entry of a molecule recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeStep {
    pub content_type: ContentType,
    pub title: Option<String>,
    pub difficulty: Option<String>,
}

impl RecipeStep {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            title: None,
            difficulty: None,
        }
    }

    pub fn difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title used for the atom row
    pub fn atom_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.content_type.default_title().to_string())
    }
}

/// Where a molecule sits, as seen by a recipe.
#[derive(Debug, Clone, Copy)]
pub struct MoleculeContext<'a> {
    pub capsule: &'a Capsule,
    pub granule: &'a Granule,
    pub molecule: &'a Molecule,
    pub plan: Option<&'a LearningPlan>,
}

impl MoleculeContext<'_> {
    /// Zero-based position of the molecule across the whole plan
    pub fn flat_index(&self) -> usize {
        self.plan
            .and_then(|p| p.flat_index(self.granule.order, self.molecule.order))
            .unwrap_or(0)
    }

    /// Number of molecules in the plan (at least 1)
    pub fn total_molecules(&self) -> usize {
        self.plan.map(LearningPlan::chapter_count).unwrap_or(0).max(1)
    }
}

/// Per-domain content strategy.
#[async_trait]
pub trait DomainBuilder: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Whether this builder serves the given taxonomy position
    fn handles(&self, domain: &str, area: &str) -> bool;

    /// Ordered atom types to produce for a molecule
    fn recipe(&self, ctx: &MoleculeContext<'_>) -> Vec<RecipeStep>;

    /// Progression stage label passed to the factory
    fn stage(&self, _ctx: &MoleculeContext<'_>) -> Option<&'static str> {
        None
    }

    /// Produce the body of one atom; `None` skips the step
    async fn build_atom(
        &self,
        factory: &AtomFactory,
        step: &RecipeStep,
        ctx: &MoleculeContext<'_>,
        context_atoms: &[AtomContent],
    ) -> Option<AtomContent> {
        let title = step.atom_title();
        let request = AtomRequest {
            content_type: step.content_type,
            title: &title,
            capsule: ctx.capsule,
            molecule: ctx.molecule,
            context: context_atoms,
            difficulty: step.difficulty.as_deref(),
            stage: self.stage(ctx),
        };
        Some(factory.generate(request).await)
    }
}

/// Builders tried in order; the default builder catches everything else.
pub struct BuilderRegistry {
    builders: Vec<Arc<dyn DomainBuilder>>,
    fallback: Arc<dyn DomainBuilder>,
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self {
            builders: vec![
                Arc::new(ProgrammingBuilder),
                Arc::new(LanguageBuilder),
                Arc::new(ScienceBuilder),
            ],
            fallback: Arc::new(DefaultBuilder),
        }
    }
}

impl BuilderRegistry {
    /// Add a builder ahead of the built-in ones
    pub fn register(&mut self, builder: Arc<dyn DomainBuilder>) {
        self.builders.insert(0, builder);
    }

    pub fn select(&self, domain: &str, area: &str) -> Arc<dyn DomainBuilder> {
        self.builders
            .iter()
            .find(|b| b.handles(domain, area))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Case-insensitive substring match against any candidate
pub(crate) fn contains_any(value: &str, candidates: &[&str]) -> bool {
    let lower = value.to_lowercase();
    candidates.iter().any(|c| lower.contains(c))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::types::{Capsule, GenerationStatus, Granule, LearningPlan, Molecule, PlanChapter, PlanLevel};

    pub fn capsule(domain: &str, area: &str, skill: &str) -> Capsule {
        Capsule {
            id: 1,
            title: skill.to_string(),
            domain: domain.to_string(),
            area: area.to_string(),
            main_skill: skill.to_string(),
            creator_id: 1,
            is_public: false,
            language: Some("fr".into()),
            learning_plan: None,
            generation_status: GenerationStatus::Generating,
            created_at: Utc::now(),
        }
    }

    pub fn granule(order: u32) -> Granule {
        Granule {
            id: 10 + order as i64,
            capsule_id: 1,
            order,
            title: format!("Level {order}"),
        }
    }

    pub fn molecule(order: u32, title: &str) -> Molecule {
        Molecule {
            id: 100 + order as i64,
            granule_id: 11,
            order,
            title: title.to_string(),
            generation_status: GenerationStatus::Pending,
        }
    }

    /// One level holding `chapters` chapters
    pub fn plan(chapters: usize) -> LearningPlan {
        LearningPlan {
            overview: serde_json::Value::String("overview".into()),
            levels: vec![PlanLevel {
                level_title: "Level 1".into(),
                chapters: (1..=chapters).map(|i| PlanChapter::new(format!("Chapter {i}"))).collect(),
                extra: Default::default(),
            }],
            extra: Default::default(),
        }
    }
}
