//! Plan cache and retrieval-augmented planner.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::embedding::EmbeddingService;
use crate::llm::LlmGateway;
use crate::store::{CozoStore, VectorStore};
use crate::types::{
    Capsule, LearningPlan, NewVectorEntry, PLAN_CONTENT_TYPE, UpsertMode, VectorFilter,
};
use crate::{EngineError, Result};

/// Golden plans injected as style references.
const INSPIRATION_PLANS: usize = 3;

/// Longest verbatim excerpt a source-based chapter may quote.
pub const MAX_EXCERPT_CHARS: usize = 240;

/// Source text beyond this many characters is cut from the prompt.
const MAX_SOURCE_CHARS: usize = 24_000;

/// Fields every chapter of a source-based plan carries.
pub const SOURCE_CHAPTER_FIELDS: [&str; 5] = [
    "chapter_summary",
    "learning_objectives",
    "key_points",
    "source_excerpt",
    "assessment_hint",
];

const PLAN_SYSTEM_PROMPT: &str = "You are a curriculum designer. Produce a complete learning plan \
as JSON with the root object {\"overview\": string, \"levels\": [...]}. The plan has between 16 and \
25 levels. Each level is {\"level_title\": string, \"chapters\": [{\"chapter_title\": string}, ...]} \
with 3 to 6 chapters ordered from easiest to hardest.";

const SOURCE_SYSTEM_PROMPT: &str = "You are a curriculum designer turning a document into a course. \
Return JSON with the root object {\"overview\": string, \"levels\": [...]}. Each level is \
{\"level_title\": string, \"chapters\": [...]} and every chapter is {\"chapter_title\": string, \
\"chapter_summary\": string, \"learning_objectives\": [string], \"key_points\": [string], \
\"source_excerpt\": string, \"assessment_hint\": string}. The source_excerpt is a verbatim quote \
of at most 240 characters from the document. Only use material present in the document.";

pub struct Planner {
    store: Arc<CozoStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<LlmGateway>,
}

impl Planner {
    pub fn new(store: Arc<CozoStore>, embeddings: Arc<EmbeddingService>, llm: Arc<LlmGateway>) -> Self {
        Self {
            store,
            embeddings,
            llm,
        }
    }

    /// First stored plan for `main_skill`, if any entry's text parses as one
    pub async fn cached_plan(&self, main_skill: &str) -> Result<Option<LearningPlan>> {
        let mut entries = self
            .store
            .entries(&VectorFilter::new().skill(main_skill))
            .await?;
        entries.sort_by_key(|e| e.id);
        Ok(entries
            .iter()
            .find_map(|e| LearningPlan::from_json_str(&e.text)))
    }

    /// Return the cached plan for the capsule's skill or build and cache one.
    #[instrument(skip(self, capsule), fields(capsule_id = capsule.id, main_skill = %capsule.main_skill))]
    pub async fn get_or_build_plan(&self, capsule: &Capsule) -> Result<LearningPlan> {
        if let Some(plan) = self.cached_plan(&capsule.main_skill).await? {
            info!("Plan cache hit");
            return Ok(plan);
        }
        info!("Plan cache miss");

        let examples = self
            .store
            .golden_plans(&capsule.domain, &capsule.area, INSPIRATION_PLANS)
            .await?;
        debug!(examples = examples.len(), "Loaded inspiration plans");

        let mut prompt = format!(
            "Create a learning plan.\nDomain: {}\nArea: {}\nMain skill: {}\nCourse title: {}\n",
            capsule.domain, capsule.area, capsule.main_skill, capsule.title
        );
        if let Some(language) = &capsule.language {
            prompt.push_str(&format!("Write the plan in the language with code '{language}'.\n"));
        }
        if !examples.is_empty() {
            prompt.push_str("\nStyle references (match their structure, do not copy content):\n");
            for example in &examples {
                prompt.push_str(&example.plan.to_value().to_string());
                prompt.push('\n');
            }
        }

        let reply = self
            .llm
            .complete_and_log(capsule.creator_id, "plan", PLAN_SYSTEM_PROMPT, &prompt, None, None)
            .await?;
        let plan = plan_from_reply(reply)?;
        if !(16..=25).contains(&plan.levels.len()) {
            warn!(levels = plan.levels.len(), "Plan level count outside 16..=25");
        }

        self.cache_plan(capsule, &plan).await?;
        Ok(plan)
    }

    /// Build a plan whose chapters quote `source_text`. Never cached.
    #[instrument(skip(self, capsule, source_text), fields(capsule_id = capsule.id, source_chars = source_text.len()))]
    pub async fn get_or_build_plan_from_source(
        &self,
        capsule: &Capsule,
        source_text: &str,
    ) -> Result<LearningPlan> {
        if source_text.trim().is_empty() {
            return Err(EngineError::InvalidInput("source text is empty".into()));
        }
        let source: String = source_text.chars().take(MAX_SOURCE_CHARS).collect();
        let prompt = format!(
            "Course title: {}\nDomain: {}\nArea: {}\nMain skill: {}\n\nDocument:\n{}",
            capsule.title, capsule.domain, capsule.area, capsule.main_skill, source
        );
        let reply = self
            .llm
            .complete_and_log(
                capsule.creator_id,
                "plan_from_source",
                SOURCE_SYSTEM_PROMPT,
                &prompt,
                None,
                None,
            )
            .await?;
        let mut plan = plan_from_reply(reply)?;
        check_source_chapters(&mut plan)?;
        info!(levels = plan.levels.len(), "Source plan built");
        Ok(plan)
    }

    async fn cache_plan(&self, capsule: &Capsule, plan: &LearningPlan) -> Result<()> {
        let vector = self.embeddings.embed(&capsule.main_skill).await;
        let entry = NewVectorEntry::new(plan.to_value().to_string(), vector, PLAN_CONTENT_TYPE)
            .domain(&capsule.domain)
            .area(&capsule.area)
            .skill(&capsule.main_skill)
            .source_language(capsule.language.clone());
        let id = self.store.upsert(entry, UpsertMode::Insert).await?;
        debug!(entry_id = id, "Plan cached");
        Ok(())
    }
}

fn plan_from_reply(reply: Map<String, Value>) -> Result<LearningPlan> {
    LearningPlan::from_value(Value::Object(reply))
        .ok_or_else(|| EngineError::Llm("reply is not a learning plan".into()))
}

/// Require the source fields on every chapter and clamp excerpts.
fn check_source_chapters(plan: &mut LearningPlan) -> Result<()> {
    for level in &mut plan.levels {
        for chapter in &mut level.chapters {
            if let Some(missing) = SOURCE_CHAPTER_FIELDS
                .iter()
                .find(|f| chapter.extra.get(**f).is_none_or(Value::is_null))
            {
                return Err(EngineError::Llm(format!(
                    "chapter '{}' is missing {missing}",
                    chapter.chapter_title
                )));
            }
            if let Some(Value::String(excerpt)) = chapter.extra.get_mut("source_excerpt")
                && excerpt.chars().count() > MAX_EXCERPT_CHARS
            {
                *excerpt = excerpt.chars().take(MAX_EXCERPT_CHARS).collect();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chapter(excerpt: &str) -> Value {
        json!({
            "chapter_title": "Cells",
            "chapter_summary": "s",
            "learning_objectives": ["o"],
            "key_points": ["k"],
            "source_excerpt": excerpt,
            "assessment_hint": "h"
        })
    }

    #[test]
    fn test_reply_must_be_a_plan() {
        let mut ok = Map::new();
        ok.insert("overview".into(), json!("x"));
        ok.insert("levels".into(), json!([{"level_title": "L1", "chapters": []}]));
        assert!(plan_from_reply(ok).is_ok());
        assert!(matches!(plan_from_reply(Map::new()), Err(EngineError::Llm(_))));
    }

    #[test]
    fn test_source_chapters_are_checked_and_clamped() {
        let long = "x".repeat(500);
        let mut plan = LearningPlan::from_value(json!({
            "overview": "bio",
            "levels": [{"level_title": "L1", "chapters": [chapter(&long)]}]
        }))
        .unwrap();
        check_source_chapters(&mut plan).unwrap();
        let excerpt = plan.levels[0].chapters[0].field_str("source_excerpt").unwrap();
        assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS);

        let mut missing = LearningPlan::from_value(json!({
            "overview": "bio",
            "levels": [{"level_title": "L1", "chapters": [{"chapter_title": "Cells"}]}]
        }))
        .unwrap();
        let err = check_source_chapters(&mut missing).unwrap_err();
        assert!(err.to_string().contains("chapter_summary"));
    }
}
