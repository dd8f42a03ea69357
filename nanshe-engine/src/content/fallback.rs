//! Static content substituted when generation fails.
//!
//! Every body produced here passes [`AtomContent::validate`], so the
//! pipeline always has something to store.

use super::bodies::*;
use super::challenges::{challenge_for, pick};
use super::AtomContent;
use crate::types::ContentType;

/// What a fallback is keyed on.
#[derive(Debug, Clone, Default)]
pub struct FallbackInput<'a> {
    pub molecule_title: &'a str,
    pub main_skill: &'a str,
    /// Learner language (ISO code)
    pub language: Option<&'a str>,
    pub difficulty: Option<&'a str>,
}

impl FallbackInput<'_> {
    fn is_french(&self) -> bool {
        self.language
            .map(|l| l.to_lowercase().starts_with("fr"))
            .unwrap_or(false)
    }

    fn code_language(&self) -> String {
        programming_language(self.main_skill)
    }
}

const KNOWN_LANGUAGES: &[&str] = &[
    "python",
    "javascript",
    "typescript",
    "rust",
    "java",
    "go",
    "c++",
    "c#",
    "ruby",
    "php",
    "sql",
    "kotlin",
    "swift",
];

/// Programming language named by a skill, defaulting to python.
pub fn programming_language(skill: &str) -> String {
    let lower = skill.to_lowercase();
    KNOWN_LANGUAGES
        .iter()
        .find(|lang| lower.split(|c: char| c.is_whitespace() || c == '_' || c == '-').any(|w| w == **lang))
        .map(|lang| lang.to_string())
        .unwrap_or_else(|| "python".to_string())
}

/// Deterministic stand-in for the given type.
pub fn fallback_content(content_type: ContentType, input: &FallbackInput<'_>) -> AtomContent {
    let title = if input.molecule_title.trim().is_empty() {
        "this lesson"
    } else {
        input.molecule_title
    };
    let difficulty = input.difficulty.unwrap_or("moyen").to_string();
    match content_type {
        ContentType::Lesson => {
            let text = if input.is_french() {
                format!(
                    "# {title}\n\nCette leçon présente les notions essentielles de « {title} ». \
                     Lisez les exemples, puis passez aux exercices pour vérifier votre compréhension."
                )
            } else {
                format!(
                    "# {title}\n\nThis lesson introduces the essentials of \"{title}\". \
                     Read through the examples, then move on to the exercises to check your understanding."
                )
            };
            AtomContent::Lesson(Lesson {
                text,
                metadata: Some(LessonMetadata {
                    cefr: None,
                    learning_focus: Some(title.to_string()),
                    language: input.language.map(str::to_string),
                }),
            })
        }
        ContentType::Vocabulary => AtomContent::Vocabulary(Vocabulary {
            items: vec![VocabularyItem {
                term: title.to_string(),
                translation: title.to_string(),
                pronunciation: None,
                example: None,
            }],
        }),
        ContentType::Grammar => AtomContent::Grammar(Grammar {
            rule: title.to_string(),
            explanation: format!("Review the rule behind \"{title}\" in the lesson above."),
            examples: Vec::new(),
        }),
        ContentType::Character => AtomContent::Character(Characters {
            characters: vec![CharacterItem {
                symbol: title.chars().next().map(String::from).unwrap_or_else(|| "?".into()),
                reading: title.to_string(),
                meaning: String::new(),
                example: None,
            }],
        }),
        ContentType::CodeExample => {
            let language = input.code_language();
            AtomContent::CodeExample(CodeExample {
                description: format!("A minimal example for {title}."),
                code: format!("# {title}\nprint(\"Hello, {language}!\")\n"),
                language,
                explanation: "Run the example and change one line at a time to see the effect."
                    .to_string(),
            })
        }
        ContentType::CodeChallenge => {
            AtomContent::CodeChallenge(challenge_for(title, &input.code_language()))
        }
        ContentType::LiveCodeExecutor => {
            let language = input.code_language();
            AtomContent::LiveCodeExecutor(LiveCodeExecutor {
                instructions: format!("Experiment with the ideas from \"{title}\" in the editor."),
                starter_code: challenge_for(title, &language).starter_code,
                language,
                hints: vec!["Print intermediate values.".to_string()],
                suggested_experiments: vec![format!("Change the input and predict the output of {title}.")],
            })
        }
        ContentType::CodeSandboxSetup => AtomContent::CodeSandboxSetup(CodeSandboxSetup {
            title: format!("Set up a sandbox for {title}"),
            language: input.code_language(),
            difficulty,
            progression_stage: "foundation".to_string(),
            workspace: SandboxWorkspace {
                recommended_mode: "local".to_string(),
                setup_steps: vec![
                    "Create an empty project folder.".to_string(),
                    "Open it in your editor.".to_string(),
                ],
                commands_to_try: Vec::new(),
            },
            security: SandboxSecurity {
                code_submission_allowed: false,
                sandbox_mode: "offline".to_string(),
                safe_usage_guidelines: vec!["Never run code you do not understand.".to_string()],
            },
            checklist: vec!["The project runs a hello-world program.".to_string()],
        }),
        ContentType::CodeProjectBrief => AtomContent::CodeProjectBrief(CodeProjectBrief {
            title: format!("Mini project: {title}"),
            summary: format!("Build a small program that applies {title}."),
            language: input.code_language(),
            difficulty,
            progression_stage: "application".to_string(),
            objectives: vec![format!("Apply {title} in a working program.")],
            milestones: vec![Milestone {
                label: "First version".to_string(),
                steps: vec!["Write the simplest program that works.".to_string()],
            }],
            deliverables: vec!["Source code".to_string()],
            validation: ProjectValidation {
                self_checklist: vec!["The program runs without errors.".to_string()],
                suggested_tests: Vec::new(),
            },
            security: ProjectSecurity {
                code_submission_allowed: false,
                reminders: vec!["Keep secrets out of your code.".to_string()],
            },
            extension_ideas: Vec::new(),
        }),
        ContentType::Quiz => AtomContent::Quiz(Quiz {
            question: format!("Which statement best describes \"{title}\"?"),
            options: vec![
                QuizOption {
                    text: format!("It is the topic covered by the lesson \"{title}\"."),
                    is_correct: true,
                },
                QuizOption {
                    text: "It is unrelated to this lesson.".to_string(),
                    is_correct: false,
                },
            ],
            explanation: "Re-read the lesson if you hesitated.".to_string(),
        }),
        ContentType::FillInBlank => AtomContent::FillInBlank(FillInBlank {
            sentence: format!("This lesson is about {BLANK}."),
            answers: vec![title.to_string()],
            hint: None,
        }),
        ContentType::Flashcards => AtomContent::Flashcards(Flashcards {
            cards: vec![Flashcard {
                front: title.to_string(),
                back: format!("Key idea of {title}"),
            }],
        }),
        ContentType::Matching => AtomContent::Matching(Matching {
            instructions: "Match each item with its description.".to_string(),
            pairs: vec![
                MatchPair {
                    left: title.to_string(),
                    right: "Topic of this lesson".to_string(),
                },
                MatchPair {
                    left: input.main_skill.to_string(),
                    right: "Skill of this course".to_string(),
                },
            ],
        }),
        ContentType::Ordering => AtomContent::Ordering(Ordering {
            instructions: "Put the study steps in order.".to_string(),
            items: vec![
                "Read the lesson".to_string(),
                "Try the exercises".to_string(),
                "Review your mistakes".to_string(),
            ],
        }),
        ContentType::Categorization => AtomContent::Categorization(Categorization {
            instructions: "Sort the items.".to_string(),
            categories: vec![
                CategoryBucket {
                    name: "About the lesson".to_string(),
                    items: vec![title.to_string()],
                },
                CategoryBucket {
                    name: "About the course".to_string(),
                    items: vec![input.main_skill.to_string()],
                },
            ],
        }),
        ContentType::DiagramCompletion => AtomContent::DiagramCompletion(DiagramCompletion {
            description: format!("Complete the outline of {title}."),
            labels: vec![DiagramLabel {
                position: "center".to_string(),
                answer: title.to_string(),
            }],
        }),
        ContentType::Dialogue => AtomContent::Dialogue(Dialogue {
            context: title.to_string(),
            lines: vec![
                DialogueLine {
                    speaker: "A".to_string(),
                    text: "Hello!".to_string(),
                    translation: None,
                },
                DialogueLine {
                    speaker: "B".to_string(),
                    text: "Hello, how are you?".to_string(),
                    translation: None,
                },
            ],
        }),
        ContentType::DialoguePractice => AtomContent::DialoguePractice(DialoguePractice {
            scenario: format!("Practice a short exchange about {title}."),
            turns: vec![PracticeTurn {
                prompt: "Hello!".to_string(),
                expected_answer: "Hello!".to_string(),
            }],
        }),
        ContentType::Translation => AtomContent::Translation(Translation {
            direction: String::new(),
            items: vec![TranslationItem {
                source: title.to_string(),
                target: title.to_string(),
            }],
        }),
        ContentType::EssayPrompt => AtomContent::EssayPrompt(EssayPrompt {
            prompt: format!("In your own words, explain what you learned in \"{title}\"."),
            guidelines: vec!["Give one concrete example.".to_string()],
            min_words: 80,
        }),
        ContentType::ShortAnswer => AtomContent::ShortAnswer(ShortAnswer {
            question: "What is the main topic of this lesson?".to_string(),
            expected_answer: title.to_string(),
            keywords: title.split_whitespace().map(str::to_lowercase).collect(),
        }),
        ContentType::TrueFalse => {
            let statements = [
                ("Reviewing mistakes helps long-term memory.", true),
                ("Skipping practice makes a lesson stick better.", false),
            ];
            let (statement, is_true) = pick(&statements, title)
                .copied()
                .unwrap_or(statements[0]);
            AtomContent::TrueFalse(TrueFalse {
                statements: vec![TrueFalseStatement {
                    statement: statement.to_string(),
                    is_true,
                    explanation: String::new(),
                }],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_fallback_validates() {
        let input = FallbackInput {
            molecule_title: "Variables",
            main_skill: "python",
            language: Some("fr"),
            difficulty: None,
        };
        for content_type in ContentType::ALL {
            let content = fallback_content(content_type, &input);
            assert_eq!(content.content_type(), content_type);
            content
                .validate()
                .unwrap_or_else(|e| panic!("{content_type} fallback invalid: {e}"));
        }
    }

    #[test]
    fn test_empty_title_still_validates() {
        let input = FallbackInput::default();
        for content_type in ContentType::ALL {
            assert!(fallback_content(content_type, &input).validate().is_ok());
        }
    }

    #[test]
    fn test_programming_language_detection() {
        assert_eq!(programming_language("Rust ownership"), "rust");
        assert_eq!(programming_language("learn_javascript"), "javascript");
        assert_eq!(programming_language("cooking"), "python");
    }

    #[test]
    fn test_lesson_language() {
        let fr = FallbackInput {
            molecule_title: "Les verbes",
            language: Some("fr"),
            ..Default::default()
        };
        match fallback_content(ContentType::Lesson, &fr) {
            AtomContent::Lesson(lesson) => assert!(lesson.text.contains("Cette leçon")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
