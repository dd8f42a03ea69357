//! Per-type content bodies and their schema checks.

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

fn invalid(what: impl Into<String>) -> EngineError {
    EngineError::InvalidInput(what.into())
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_items<T>(field: &str, items: &[T], min: usize) -> Result<()> {
    if items.len() < min {
        return Err(invalid(format!(
            "{field} needs at least {min} item(s), got {}",
            items.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cefr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_focus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    /// Markdown
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<LessonMetadata>,
}

impl Lesson {
    pub fn validate(&self) -> Result<()> {
        require_text("text", &self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub term: String,
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub items: Vec<VocabularyItem>,
}

impl Vocabulary {
    pub fn validate(&self) -> Result<()> {
        require_items("items", &self.items, 1)?;
        for item in &self.items {
            require_text("term", &item.term)?;
            require_text("translation", &item.translation)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grammar {
    pub rule: String,
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl Grammar {
    pub fn validate(&self) -> Result<()> {
        require_text("rule", &self.rule)?;
        require_text("explanation", &self.explanation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterItem {
    pub symbol: String,
    pub reading: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characters {
    pub characters: Vec<CharacterItem>,
}

impl Characters {
    pub fn validate(&self) -> Result<()> {
        require_items("characters", &self.characters, 1)?;
        for c in &self.characters {
            require_text("symbol", &c.symbol)?;
            require_text("reading", &c.reading)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExample {
    pub description: String,
    pub language: String,
    pub code: String,
    pub explanation: String,
}

impl CodeExample {
    pub fn validate(&self) -> Result<()> {
        require_text("language", &self.language)?;
        require_text("code", &self.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTest {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub title: String,
    pub description: String,
    pub language: String,
    pub starter_code: String,
    pub sample_tests: Vec<SampleTest>,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl CodeChallenge {
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("language", &self.language)?;
        require_items("sample_tests", &self.sample_tests, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCodeExecutor {
    pub language: String,
    pub instructions: String,
    pub starter_code: String,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub suggested_experiments: Vec<String>,
}

impl LiveCodeExecutor {
    pub fn validate(&self) -> Result<()> {
        require_text("language", &self.language)?;
        require_text("instructions", &self.instructions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxWorkspace {
    pub recommended_mode: String,
    #[serde(default)]
    pub setup_steps: Vec<String>,
    #[serde(default)]
    pub commands_to_try: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSecurity {
    pub code_submission_allowed: bool,
    pub sandbox_mode: String,
    #[serde(default)]
    pub safe_usage_guidelines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSandboxSetup {
    pub title: String,
    pub language: String,
    pub difficulty: String,
    pub progression_stage: String,
    pub workspace: SandboxWorkspace,
    pub security: SandboxSecurity,
    #[serde(default)]
    pub checklist: Vec<String>,
}

impl CodeSandboxSetup {
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_items("workspace.setup_steps", &self.workspace.setup_steps, 1)?;
        if self.security.code_submission_allowed {
            return Err(invalid("security.code_submission_allowed must be false"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectValidation {
    #[serde(default)]
    pub self_checklist: Vec<String>,
    #[serde(default)]
    pub suggested_tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSecurity {
    pub code_submission_allowed: bool,
    #[serde(default)]
    pub reminders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeProjectBrief {
    pub title: String,
    pub summary: String,
    pub language: String,
    pub difficulty: String,
    pub progression_stage: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    pub validation: ProjectValidation,
    pub security: ProjectSecurity,
    #[serde(default)]
    pub extension_ideas: Vec<String>,
}

impl CodeProjectBrief {
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("summary", &self.summary)?;
        require_items("objectives", &self.objectives, 1)?;
        require_items("milestones", &self.milestones, 1)?;
        if self.security.code_submission_allowed {
            return Err(invalid("security.code_submission_allowed must be false"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub question: String,
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub explanation: String,
}

impl Quiz {
    pub fn validate(&self) -> Result<()> {
        require_text("question", &self.question)?;
        require_items("options", &self.options, 2)?;
        let correct = self.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(invalid(format!(
                "quiz needs exactly one correct option, got {correct}"
            )));
        }
        Ok(())
    }
}

/// Blank marker inside a fill-in-the-blank sentence.
pub const BLANK: &str = "___";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillInBlank {
    /// Sentence containing one `___` per answer
    pub sentence: String,
    pub answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FillInBlank {
    pub fn validate(&self) -> Result<()> {
        require_items("answers", &self.answers, 1)?;
        let blanks = self.sentence.matches(BLANK).count();
        if blanks != self.answers.len() {
            return Err(invalid(format!(
                "sentence has {blanks} blank(s) for {} answer(s)",
                self.answers.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcards {
    pub cards: Vec<Flashcard>,
}

impl Flashcards {
    pub fn validate(&self) -> Result<()> {
        require_items("cards", &self.cards, 1)?;
        for card in &self.cards {
            require_text("front", &card.front)?;
            require_text("back", &card.back)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matching {
    #[serde(default)]
    pub instructions: String,
    pub pairs: Vec<MatchPair>,
}

impl Matching {
    pub fn validate(&self) -> Result<()> {
        require_items("pairs", &self.pairs, 2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    #[serde(default)]
    pub instructions: String,
    /// Items in their correct order
    pub items: Vec<String>,
}

impl Ordering {
    pub fn validate(&self) -> Result<()> {
        require_items("items", &self.items, 2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBucket {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    #[serde(default)]
    pub instructions: String,
    pub categories: Vec<CategoryBucket>,
}

impl Categorization {
    pub fn validate(&self) -> Result<()> {
        require_items("categories", &self.categories, 2)?;
        for bucket in &self.categories {
            require_items("categories.items", &bucket.items, 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramLabel {
    pub position: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramCompletion {
    pub description: String,
    pub labels: Vec<DiagramLabel>,
}

impl DiagramCompletion {
    pub fn validate(&self) -> Result<()> {
        require_text("description", &self.description)?;
        require_items("labels", &self.labels, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    #[serde(default)]
    pub context: String,
    pub lines: Vec<DialogueLine>,
}

impl Dialogue {
    pub fn validate(&self) -> Result<()> {
        require_items("lines", &self.lines, 2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeTurn {
    pub prompt: String,
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialoguePractice {
    pub scenario: String,
    pub turns: Vec<PracticeTurn>,
}

impl DialoguePractice {
    pub fn validate(&self) -> Result<()> {
        require_text("scenario", &self.scenario)?;
        require_items("turns", &self.turns, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationItem {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub direction: String,
    pub items: Vec<TranslationItem>,
}

impl Translation {
    pub fn validate(&self) -> Result<()> {
        require_items("items", &self.items, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EssayPrompt {
    pub prompt: String,
    #[serde(default)]
    pub guidelines: Vec<String>,
    #[serde(default)]
    pub min_words: u32,
}

impl EssayPrompt {
    pub fn validate(&self) -> Result<()> {
        require_text("prompt", &self.prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortAnswer {
    pub question: String,
    pub expected_answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ShortAnswer {
    pub fn validate(&self) -> Result<()> {
        require_text("question", &self.question)?;
        require_text("expected_answer", &self.expected_answer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueFalseStatement {
    pub statement: String,
    pub is_true: bool,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueFalse {
    pub statements: Vec<TrueFalseStatement>,
}

impl TrueFalse {
    pub fn validate(&self) -> Result<()> {
        require_items("statements", &self.statements, 1)
    }
}
