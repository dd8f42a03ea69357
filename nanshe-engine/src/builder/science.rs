//! Science recipes.

use async_trait::async_trait;

use super::{DomainBuilder, MoleculeContext, RecipeStep, contains_any};
use crate::types::ContentType;

const DOMAINS: &[&str] = &["science", "math", "chemistry", "chimie", "physics", "physique", "biolog"];
const MATH: &[&str] = &["math", "algebra", "algèbre", "geometr", "calcul", "statisti"];
const CHEMISTRY: &[&str] = &["chemistry", "chimie"];
const PHYSICS: &[&str] = &["physics", "physique"];

pub struct ScienceBuilder;

#[async_trait]
impl DomainBuilder for ScienceBuilder {
    fn name(&self) -> &'static str {
        "science"
    }

    fn handles(&self, domain: &str, area: &str) -> bool {
        contains_any(domain, DOMAINS) || contains_any(area, DOMAINS)
    }

    fn recipe(&self, ctx: &MoleculeContext<'_>) -> Vec<RecipeStep> {
        let mut steps: Vec<RecipeStep> = [
            ContentType::Lesson,
            ContentType::Flashcards,
            ContentType::FillInBlank,
            ContentType::TrueFalse,
            ContentType::ShortAnswer,
            ContentType::Matching,
            ContentType::Ordering,
        ]
        .into_iter()
        .map(RecipeStep::new)
        .collect();

        let area = format!("{} {}", ctx.capsule.area, ctx.capsule.main_skill);
        if contains_any(&area, MATH) {
            steps.push(RecipeStep::new(ContentType::Quiz));
            steps.push(RecipeStep::new(ContentType::Categorization));
        } else if contains_any(&area, CHEMISTRY) {
            steps.push(RecipeStep::new(ContentType::DiagramCompletion));
        } else if contains_any(&area, PHYSICS) {
            steps.push(RecipeStep::new(ContentType::Quiz).difficulty("difficile"));
        }
        steps
    }
}
