//! Atom factory: one content body per call, never failing.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::content::{AtomContent, FallbackInput, fallback_content, programming_language};
use crate::embedding::EmbeddingService;
use crate::llm::LlmGateway;
use crate::store::{CozoStore, VectorStore};
use crate::types::{Capsule, ContentType, Molecule, NewVectorEntry, UpsertMode};
use crate::Result;

/// Characters of a context body quoted into a prompt.
const CONTEXT_CHARS: usize = 4_000;

/// Everything the factory needs to produce one atom.
#[derive(Debug, Clone, Copy)]
pub struct AtomRequest<'a> {
    pub content_type: ContentType,
    pub title: &'a str,
    pub capsule: &'a Capsule,
    pub molecule: &'a Molecule,
    /// Bodies already produced for this molecule, in order
    pub context: &'a [AtomContent],
    pub difficulty: Option<&'a str>,
    /// Progression stage label ("foundation", "mastery", ...)
    pub stage: Option<&'a str>,
}

pub struct AtomFactory {
    store: Arc<CozoStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<LlmGateway>,
}

impl AtomFactory {
    pub fn new(store: Arc<CozoStore>, embeddings: Arc<EmbeddingService>, llm: Arc<LlmGateway>) -> Self {
        Self {
            store,
            embeddings,
            llm,
        }
    }

    /// Produce a validated body for the request.
    ///
    /// Falls back to static content when the model reply is unusable, and
    /// indexes the result in the vector store.
    #[instrument(skip(self, request), fields(content_type = %request.content_type, molecule_id = request.molecule.id))]
    pub async fn generate(&self, request: AtomRequest<'_>) -> AtomContent {
        let content = match self.from_llm(&request).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Atom generation failed, using fallback content");
                fallback_content(
                    request.content_type,
                    &FallbackInput {
                        molecule_title: &request.molecule.title,
                        main_skill: &request.capsule.main_skill,
                        language: request.capsule.language.as_deref(),
                        difficulty: request.difficulty,
                    },
                )
            }
        };
        if let Err(e) = self.index(&request, &content).await {
            warn!(error = %e, "Could not index atom content");
        }
        content
    }

    async fn from_llm(&self, request: &AtomRequest<'_>) -> Result<AtomContent> {
        let system = format!(
            "You write learning content for one exercise of an online course.\n{}\n\
             Return only a JSON object with this shape:\n{}",
            instructions(request.content_type),
            schema(request.content_type)
        );
        let user = self.user_prompt(request).await?;
        let feature = format!("atom:{}", request.content_type);
        let reply = self
            .llm
            .complete_and_log(request.capsule.creator_id, &feature, &system, &user, None, None)
            .await?;
        AtomContent::from_value(request.content_type, Value::Object(reply))
    }

    async fn user_prompt(&self, request: &AtomRequest<'_>) -> Result<String> {
        let capsule = request.capsule;
        let mut prompt = format!(
            "Course: {}\nDomain: {} / {}\nMain skill: {}\nCurrent lesson: {}\nExercise title: {}\n",
            capsule.title,
            capsule.domain,
            capsule.area,
            capsule.main_skill,
            request.molecule.title,
            request.title
        );
        if let Some(language) = &capsule.language {
            prompt.push_str(&format!("Learner language: {language}\n"));
        }
        if matches!(
            request.content_type,
            ContentType::CodeExample
                | ContentType::CodeChallenge
                | ContentType::LiveCodeExecutor
                | ContentType::CodeSandboxSetup
                | ContentType::CodeProjectBrief
        ) {
            prompt.push_str(&format!(
                "Programming language: {}\n",
                programming_language(&capsule.main_skill)
            ));
        }
        if let Some(difficulty) = request.difficulty {
            prompt.push_str(&format!("Difficulty: {difficulty}\n"));
        }
        if let Some(stage) = request.stage {
            prompt.push_str(&format!("Progression stage: {stage}\n"));
        }

        // outline comes from the stored tree so it reflects what exists now
        let outline = self.store.capsule_outline(capsule.id).await?;
        if !outline.is_empty() {
            prompt.push_str("\nCourse outline so far:\n");
            for entry in &outline {
                let marker = if entry.molecule.id == request.molecule.id { " <- current" } else { "" };
                prompt.push_str(&format!(
                    "- {} / {}{}\n",
                    entry.granule.title, entry.molecule.title, marker
                ));
            }
        }

        if !request.context.is_empty() {
            prompt.push_str("\nContent already written for this lesson:\n");
            for body in request.context {
                let text: String = body.text_for_embedding().chars().take(CONTEXT_CHARS).collect();
                prompt.push_str(&format!("[{}]\n{}\n", body.content_type(), text));
            }
        }
        Ok(prompt)
    }

    async fn index(&self, request: &AtomRequest<'_>, content: &AtomContent) -> Result<()> {
        let text = content.text_for_embedding();
        let vector = self.embeddings.embed(&text).await;
        let entry = NewVectorEntry::new(text, vector, request.content_type.as_str())
            .domain(&request.capsule.domain)
            .area(&request.capsule.area)
            .skill(&request.molecule.title)
            .source_language(request.capsule.language.clone())
            .owner(request.capsule.id, request.molecule.id)
            .metadata(json!({ "title": request.title }));
        let id = self.store.upsert(entry, UpsertMode::SoftKey).await?;
        debug!(entry_id = id, "Atom content indexed");
        Ok(())
    }
}

fn instructions(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Lesson => "Write a clear markdown lesson of 300 to 600 words with examples.",
        ContentType::Vocabulary => "List 8 to 12 useful terms for the lesson with translations.",
        ContentType::Grammar => "Explain one grammar rule of the lesson with examples.",
        ContentType::Character => "Introduce 5 to 10 characters of the writing system.",
        ContentType::CodeExample => "Show one short, runnable code example for the lesson.",
        ContentType::CodeChallenge => {
            "Write a small coding challenge with sample tests. Inputs and outputs are strings."
        }
        ContentType::LiveCodeExecutor => "Prepare a live coding playground for the lesson.",
        ContentType::CodeSandboxSetup => {
            "Describe how to set up a local sandbox. Code is never submitted to the platform."
        }
        ContentType::CodeProjectBrief => {
            "Write a project brief with milestones. Code is never submitted to the platform."
        }
        ContentType::Quiz => {
            "Write one multiple-choice question about the lesson with exactly one correct option."
        }
        ContentType::FillInBlank => "Write a sentence with blanks marked ___ and one answer per blank.",
        ContentType::Flashcards => "Write 6 to 10 flashcards covering the lesson.",
        ContentType::Matching => "Write 4 to 6 pairs to match.",
        ContentType::Ordering => "Write 4 to 6 items to put in the correct order.",
        ContentType::Categorization => "Write 2 to 4 categories with items that belong to each.",
        ContentType::DiagramCompletion => "Describe a diagram and the labels to place on it.",
        ContentType::Dialogue => "Write a short dialogue between two speakers using the lesson.",
        ContentType::DialoguePractice => "Write a role-play where the learner answers each turn.",
        ContentType::Translation => "Write 4 to 6 sentences to translate.",
        ContentType::EssayPrompt => "Write an essay prompt with guidelines.",
        ContentType::ShortAnswer => "Write one open question with its expected answer and keywords.",
        ContentType::TrueFalse => "Write 4 to 6 true or false statements with explanations.",
    }
}

fn schema(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Lesson => {
            r#"{"text": "markdown", "metadata": {"cefr": "A1", "learning_focus": "...", "language": "fr"}}"#
        }
        ContentType::Vocabulary => {
            r#"{"items": [{"term": "...", "translation": "...", "pronunciation": "...", "example": "..."}]}"#
        }
        ContentType::Grammar => r#"{"rule": "...", "explanation": "...", "examples": ["..."]}"#,
        ContentType::Character => {
            r#"{"characters": [{"symbol": "...", "reading": "...", "meaning": "...", "example": "..."}]}"#
        }
        ContentType::CodeExample => {
            r#"{"description": "...", "language": "...", "code": "...", "explanation": "..."}"#
        }
        ContentType::CodeChallenge => {
            r#"{"title": "...", "description": "...", "language": "...", "starter_code": "...", "sample_tests": [{"input": "...", "output": "..."}], "hints": ["..."]}"#
        }
        ContentType::LiveCodeExecutor => {
            r#"{"language": "...", "instructions": "...", "starter_code": "...", "hints": ["..."], "suggested_experiments": ["..."]}"#
        }
        ContentType::CodeSandboxSetup => {
            r#"{"title": "...", "language": "...", "difficulty": "...", "progression_stage": "...", "workspace": {"recommended_mode": "...", "setup_steps": ["..."], "commands_to_try": ["..."]}, "security": {"code_submission_allowed": false, "sandbox_mode": "...", "safe_usage_guidelines": ["..."]}, "checklist": ["..."]}"#
        }
        ContentType::CodeProjectBrief => {
            r#"{"title": "...", "summary": "...", "language": "...", "difficulty": "...", "progression_stage": "...", "objectives": ["..."], "milestones": [{"label": "...", "steps": ["..."]}], "deliverables": ["..."], "validation": {"self_checklist": ["..."], "suggested_tests": ["..."]}, "security": {"code_submission_allowed": false, "reminders": ["..."]}, "extension_ideas": ["..."]}"#
        }
        ContentType::Quiz => {
            r#"{"question": "...", "options": [{"text": "...", "is_correct": true}, {"text": "...", "is_correct": false}], "explanation": "..."}"#
        }
        ContentType::FillInBlank => {
            r#"{"sentence": "The ___ is blue.", "answers": ["sky"], "hint": "..."}"#
        }
        ContentType::Flashcards => r#"{"cards": [{"front": "...", "back": "..."}]}"#,
        ContentType::Matching => {
            r#"{"instructions": "...", "pairs": [{"left": "...", "right": "..."}]}"#
        }
        ContentType::Ordering => r#"{"instructions": "...", "items": ["first", "second"]}"#,
        ContentType::Categorization => {
            r#"{"instructions": "...", "categories": [{"name": "...", "items": ["..."]}]}"#
        }
        ContentType::DiagramCompletion => {
            r#"{"description": "...", "labels": [{"position": "...", "answer": "..."}]}"#
        }
        ContentType::Dialogue => {
            r#"{"context": "...", "lines": [{"speaker": "...", "text": "...", "translation": "..."}]}"#
        }
        ContentType::DialoguePractice => {
            r#"{"scenario": "...", "turns": [{"prompt": "...", "expected_answer": "..."}]}"#
        }
        ContentType::Translation => {
            r#"{"direction": "fr->ja", "items": [{"source": "...", "target": "..."}]}"#
        }
        ContentType::EssayPrompt => {
            r#"{"prompt": "...", "guidelines": ["..."], "min_words": 150}"#
        }
        ContentType::ShortAnswer => {
            r#"{"question": "...", "expected_answer": "...", "keywords": ["..."]}"#
        }
        ContentType::TrueFalse => {
            r#"{"statements": [{"statement": "...", "is_true": true, "explanation": "..."}]}"#
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_schema_mentions_its_required_keys() {
        for ct in ContentType::ALL {
            let schema: Value = serde_json::from_str(schema(ct)).unwrap();
            assert!(schema.is_object(), "{ct}");
            assert!(!instructions(ct).is_empty());
        }
        assert!(schema(ContentType::Quiz).contains("is_correct"));
        assert!(schema(ContentType::CodeChallenge).contains("sample_tests"));
    }

    #[test]
    fn test_schema_examples_for_simple_types_parse() {
        for ct in [
            ContentType::Grammar,
            ContentType::Flashcards,
            ContentType::Ordering,
            ContentType::ShortAnswer,
            ContentType::Quiz,
            ContentType::FillInBlank,
        ] {
            let value: Value = serde_json::from_str(schema(ct)).unwrap();
            assert!(AtomContent::from_value(ct, value).is_ok(), "{ct}");
        }
    }
}
