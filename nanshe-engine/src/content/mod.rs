//! Typed atom bodies.
//!
//! Model replies arrive as loose JSON. [`AtomContent::from_value`] repairs
//! the common shape mistakes, parses into the body struct for the content
//! type and checks the per-type rules. Stored bodies were validated when
//! written and are read back with [`AtomContent::from_stored`].

mod bodies;
mod challenges;
mod fallback;

pub use bodies::*;
pub use challenges::{challenge_for, stable_hash};
pub use fallback::{FallbackInput, fallback_content, programming_language};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ContentType;
use crate::{EngineError, Result};

macro_rules! atom_contents {
    ($($variant:ident($body:ty)),+ $(,)?) => {
        /// Body of an atom, one variant per [`ContentType`].
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "content_type", content = "body", rename_all = "snake_case")]
        pub enum AtomContent {
            $($variant($body)),+
        }

        impl AtomContent {
            pub fn content_type(&self) -> ContentType {
                match self {
                    $(AtomContent::$variant(_) => ContentType::$variant),+
                }
            }

            /// Check the per-type rules.
            pub fn validate(&self) -> Result<()> {
                match self {
                    $(AtomContent::$variant(body) => body.validate()),+
                }
            }

            /// The bare body, as stored and as sent to clients.
            pub fn to_value(&self) -> Value {
                let value = match self {
                    $(AtomContent::$variant(body) => serde_json::to_value(body)),+
                };
                value.unwrap_or(Value::Null)
            }

            fn parse_body(content_type: ContentType, value: Value) -> serde_json::Result<Self> {
                Ok(match content_type {
                    $(ContentType::$variant => AtomContent::$variant(serde_json::from_value(value)?)),+
                })
            }
        }
    };
}

atom_contents! {
    Lesson(Lesson),
    Vocabulary(Vocabulary),
    Grammar(Grammar),
    Character(Characters),
    CodeExample(CodeExample),
    CodeChallenge(CodeChallenge),
    LiveCodeExecutor(LiveCodeExecutor),
    CodeSandboxSetup(CodeSandboxSetup),
    CodeProjectBrief(CodeProjectBrief),
    Quiz(Quiz),
    FillInBlank(FillInBlank),
    Flashcards(Flashcards),
    Matching(Matching),
    Ordering(Ordering),
    Categorization(Categorization),
    DiagramCompletion(DiagramCompletion),
    Dialogue(Dialogue),
    DialoguePractice(DialoguePractice),
    Translation(Translation),
    EssayPrompt(EssayPrompt),
    ShortAnswer(ShortAnswer),
    TrueFalse(TrueFalse),
}

impl AtomContent {
    /// Normalize, parse and validate a model reply.
    pub fn from_value(content_type: ContentType, value: Value) -> Result<Self> {
        let value = normalize(content_type, value);
        let content = Self::parse_body(content_type, value).map_err(|e| {
            EngineError::InvalidInput(format!("{content_type} body does not match schema: {e}"))
        })?;
        content.validate()?;
        Ok(content)
    }

    /// Parse a body read back from storage.
    pub fn from_stored(content_type: ContentType, value: Value) -> Result<Self> {
        Self::parse_body(content_type, value)
            .map_err(|e| EngineError::Serialization(format!("stored {content_type} body: {e}")))
    }

    /// Text indexed in the vector store for this body.
    pub fn text_for_embedding(&self) -> String {
        match self {
            AtomContent::Lesson(lesson) => lesson.text.clone(),
            AtomContent::Quiz(quiz) => {
                let mut text = quiz.question.clone();
                for option in &quiz.options {
                    text.push('\n');
                    text.push_str(&option.text);
                }
                text
            }
            AtomContent::Grammar(grammar) => format!("{}\n{}", grammar.rule, grammar.explanation),
            AtomContent::CodeExample(example) => {
                format!("{}\n{}", example.description, example.explanation)
            }
            AtomContent::CodeChallenge(challenge) => {
                format!("{}\n{}", challenge.title, challenge.description)
            }
            AtomContent::Vocabulary(vocab) => vocab
                .items
                .iter()
                .map(|i| format!("{}: {}", i.term, i.translation))
                .collect::<Vec<_>>()
                .join("\n"),
            AtomContent::Flashcards(cards) => cards
                .cards
                .iter()
                .map(|c| format!("{}: {}", c.front, c.back))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_value().to_string(),
        }
    }
}

/// Repair the shapes models commonly return instead of the schema.
fn normalize(content_type: ContentType, value: Value) -> Value {
    let mut value = unwrap_envelope(content_type, value);
    let Some(obj) = value.as_object_mut() else {
        return value;
    };
    match content_type {
        ContentType::Lesson => {
            if !obj.contains_key("text")
                && let Some(text) = obj.remove("content").or_else(|| obj.remove("markdown"))
            {
                obj.insert("text".into(), text);
            }
        }
        ContentType::CodeChallenge => normalize_challenge(obj),
        ContentType::Quiz => normalize_quiz(obj),
        ContentType::CodeSandboxSetup | ContentType::CodeProjectBrief => {
            if let Some(security) = obj.get_mut("security").and_then(Value::as_object_mut) {
                security.insert("code_submission_allowed".into(), Value::Bool(false));
            }
        }
        _ => {}
    }
    value
}

/// `{"quiz": {...}}` and `{"content": {...}}` wrappers around the body.
fn unwrap_envelope(content_type: ContentType, value: Value) -> Value {
    if let Value::Object(mut obj) = value {
        if obj.len() == 1 {
            for key in [content_type.as_str(), "content", "data"] {
                if matches!(obj.get(key), Some(Value::Object(_)))
                    && let Some(inner) = obj.remove(key)
                {
                    return inner;
                }
            }
        }
        Value::Object(obj)
    } else {
        value
    }
}

fn normalize_challenge(obj: &mut Map<String, Value>) {
    if !obj.contains_key("sample_tests") {
        let tests = match obj.remove("tests") {
            Some(Value::Object(mut wrapper)) => wrapper.remove("tests").or_else(|| wrapper.remove("sample_tests")),
            other => other,
        };
        if let Some(tests) = tests {
            obj.insert("sample_tests".into(), tests);
        }
    }
    if let Some(Value::Array(tests)) = obj.get_mut("sample_tests") {
        for test in tests.iter_mut().filter_map(Value::as_object_mut) {
            for key in ["input", "output"] {
                let coerced = match test.get(key) {
                    Some(Value::String(_)) => continue,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                test.insert(key.into(), Value::String(coerced));
            }
        }
    }
}

fn normalize_quiz(obj: &mut Map<String, Value>) {
    let answer = obj
        .get("answer")
        .or_else(|| obj.get("correct_answer"))
        .cloned();
    let Some(Value::Array(options)) = obj.get_mut("options") else {
        return;
    };
    if !options.iter().all(Value::is_string) {
        return;
    }
    let answer_text = match &answer {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    let answer_index = match &answer {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        _ => None,
    };
    let converted = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let text = option.as_str().unwrap_or_default().to_string();
            let is_correct = answer_index == Some(i) || answer_text.as_deref() == Some(text.as_str());
            serde_json::json!({"text": text, "is_correct": is_correct})
        })
        .collect();
    *options = converted;
}
