//! Recipe for domains without a dedicated builder.

use async_trait::async_trait;

use super::{DomainBuilder, MoleculeContext, RecipeStep};
use crate::types::ContentType;

pub struct DefaultBuilder;

#[async_trait]
impl DomainBuilder for DefaultBuilder {
    fn name(&self) -> &'static str {
        "default"
    }

    fn handles(&self, _domain: &str, _area: &str) -> bool {
        true
    }

    fn recipe(&self, _ctx: &MoleculeContext<'_>) -> Vec<RecipeStep> {
        [
            ContentType::Lesson,
            ContentType::Flashcards,
            ContentType::Quiz,
            ContentType::ShortAnswer,
        ]
        .into_iter()
        .map(RecipeStep::new)
        .collect()
    }
}
