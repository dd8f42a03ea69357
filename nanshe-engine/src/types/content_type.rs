//! The closed set of atom kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Kind of content an atom carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Lesson,
    Vocabulary,
    Grammar,
    Character,
    CodeExample,
    CodeChallenge,
    LiveCodeExecutor,
    CodeSandboxSetup,
    CodeProjectBrief,
    Quiz,
    FillInBlank,
    Flashcards,
    Matching,
    Ordering,
    Categorization,
    DiagramCompletion,
    Dialogue,
    DialoguePractice,
    Translation,
    EssayPrompt,
    ShortAnswer,
    TrueFalse,
}

impl ContentType {
    /// Every content type, in declaration order.
    pub const ALL: [ContentType; 22] = [
        ContentType::Lesson,
        ContentType::Vocabulary,
        ContentType::Grammar,
        ContentType::Character,
        ContentType::CodeExample,
        ContentType::CodeChallenge,
        ContentType::LiveCodeExecutor,
        ContentType::CodeSandboxSetup,
        ContentType::CodeProjectBrief,
        ContentType::Quiz,
        ContentType::FillInBlank,
        ContentType::Flashcards,
        ContentType::Matching,
        ContentType::Ordering,
        ContentType::Categorization,
        ContentType::DiagramCompletion,
        ContentType::Dialogue,
        ContentType::DialoguePractice,
        ContentType::Translation,
        ContentType::EssayPrompt,
        ContentType::ShortAnswer,
        ContentType::TrueFalse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Lesson => "lesson",
            ContentType::Vocabulary => "vocabulary",
            ContentType::Grammar => "grammar",
            ContentType::Character => "character",
            ContentType::CodeExample => "code_example",
            ContentType::CodeChallenge => "code_challenge",
            ContentType::LiveCodeExecutor => "live_code_executor",
            ContentType::CodeSandboxSetup => "code_sandbox_setup",
            ContentType::CodeProjectBrief => "code_project_brief",
            ContentType::Quiz => "quiz",
            ContentType::FillInBlank => "fill_in_blank",
            ContentType::Flashcards => "flashcards",
            ContentType::Matching => "matching",
            ContentType::Ordering => "ordering",
            ContentType::Categorization => "categorization",
            ContentType::DiagramCompletion => "diagram_completion",
            ContentType::Dialogue => "dialogue",
            ContentType::DialoguePractice => "dialogue_practice",
            ContentType::Translation => "translation",
            ContentType::EssayPrompt => "essay_prompt",
            ContentType::ShortAnswer => "short_answer",
            ContentType::TrueFalse => "true_false",
        }
    }

    /// Human-readable default title for an atom of this type.
    pub fn default_title(&self) -> &'static str {
        match self {
            ContentType::Lesson => "Lesson",
            ContentType::Vocabulary => "Vocabulary",
            ContentType::Grammar => "Grammar",
            ContentType::Character => "Characters",
            ContentType::CodeExample => "Code example",
            ContentType::CodeChallenge => "Code challenge",
            ContentType::LiveCodeExecutor => "Live coding",
            ContentType::CodeSandboxSetup => "Sandbox setup",
            ContentType::CodeProjectBrief => "Project brief",
            ContentType::Quiz => "Quiz",
            ContentType::FillInBlank => "Fill in the blank",
            ContentType::Flashcards => "Flashcards",
            ContentType::Matching => "Matching",
            ContentType::Ordering => "Ordering",
            ContentType::Categorization => "Categorization",
            ContentType::DiagramCompletion => "Diagram",
            ContentType::Dialogue => "Dialogue",
            ContentType::DialoguePractice => "Dialogue practice",
            ContentType::Translation => "Translation",
            ContentType::EssayPrompt => "Essay",
            ContentType::ShortAnswer => "Short answer",
            ContentType::TrueFalse => "True or false",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown content type: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_roundtrips_through_str() {
        for t in ContentType::ALL {
            assert_eq!(t.as_str().parse::<ContentType>().unwrap(), t);
        }
    }

    #[test]
    fn test_serde_matches_as_str() {
        for t in ContentType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_unknown_type_is_invalid_input() {
        let err = "hologram".parse::<ContentType>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
