//! Foreign-language recipes.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{DomainBuilder, MoleculeContext, RecipeStep, contains_any};
use crate::types::ContentType;

const DOMAINS: &[&str] = &["language", "langue"];

/// Molecule titles about a writing system.
const SCRIPT_KEYWORDS: &[&str] = &[
    "hiragana",
    "katakana",
    "kanji",
    "hangul",
    "hanzi",
    "pinyin",
    "alphabet",
    "cyrillic",
    "cyrillique",
    "script",
    "écriture",
    "ecriture",
    "caractères",
    "characters",
];

static CONVERSATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(conversations?|dialogues?|dialogs?|discussions?|greetings?|salutations?|présentations?|presentations?|introduc\w*|small talk|parler|speaking|chat)\b",
    )
    .ok()
});

pub struct LanguageBuilder;

impl LanguageBuilder {
    pub fn is_script_molecule(title: &str) -> bool {
        contains_any(title, SCRIPT_KEYWORDS)
    }

    pub fn is_conversation_molecule(title: &str) -> bool {
        CONVERSATION
            .as_ref()
            .is_some_and(|re| re.is_match(title))
    }
}

#[async_trait]
impl DomainBuilder for LanguageBuilder {
    fn name(&self) -> &'static str {
        "language"
    }

    fn handles(&self, domain: &str, area: &str) -> bool {
        contains_any(domain, DOMAINS) || contains_any(area, DOMAINS)
    }

    fn recipe(&self, ctx: &MoleculeContext<'_>) -> Vec<RecipeStep> {
        let title = &ctx.molecule.title;
        if Self::is_script_molecule(title) {
            return [
                ContentType::Lesson,
                ContentType::Character,
                ContentType::Dialogue,
                ContentType::DialoguePractice,
                ContentType::Translation,
                ContentType::Flashcards,
                ContentType::Matching,
                ContentType::Quiz,
            ]
            .into_iter()
            .map(RecipeStep::new)
            .collect();
        }

        let mut types = vec![
            ContentType::Lesson,
            ContentType::Vocabulary,
            ContentType::Translation,
            ContentType::DialoguePractice,
            ContentType::Matching,
            ContentType::Flashcards,
            ContentType::Quiz,
        ];
        if Self::is_conversation_molecule(title) {
            types.insert(3, ContentType::Dialogue);
        }
        types.into_iter().map(RecipeStep::new).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::{capsule, granule, molecule};

    fn recipe_for(title: &str) -> Vec<ContentType> {
        let capsule = capsule("languages", "asian_languages", "japanese");
        let granule = granule(1);
        let molecule = molecule(1, title);
        let ctx = MoleculeContext {
            capsule: &capsule,
            granule: &granule,
            molecule: &molecule,
            plan: None,
        };
        LanguageBuilder
            .recipe(&ctx)
            .into_iter()
            .map(|s| s.content_type)
            .collect()
    }

    #[test]
    fn test_script_molecule_recipe() {
        let types = recipe_for("Les hiragana de base");
        assert_eq!(types[1], ContentType::Character);
        assert_eq!(types.len(), 8);
        assert_eq!(types.last(), Some(&ContentType::Quiz));
    }

    #[test]
    fn test_default_recipe_has_no_dialogue() {
        let types = recipe_for("Les nombres");
        assert_eq!(
            types,
            vec![
                ContentType::Lesson,
                ContentType::Vocabulary,
                ContentType::Translation,
                ContentType::DialoguePractice,
                ContentType::Matching,
                ContentType::Flashcards,
                ContentType::Quiz,
            ]
        );
    }

    #[test]
    fn test_conversation_inserts_dialogue_after_translation() {
        let types = recipe_for("Conversation au restaurant");
        assert_eq!(types[2], ContentType::Translation);
        assert_eq!(types[3], ContentType::Dialogue);
        assert_eq!(types.len(), 8);
    }

    #[test]
    fn test_handles_language_domains() {
        assert!(LanguageBuilder.handles("languages", "asian_languages"));
        assert!(LanguageBuilder.handles("Langues", "europe"));
        assert!(!LanguageBuilder.handles("programming", "backend"));
    }
}
