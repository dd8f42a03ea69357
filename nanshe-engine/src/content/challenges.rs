//! Built-in code challenges used when a model reply has no usable tests.

use sha2::{Digest, Sha256};

use super::bodies::{CodeChallenge, SampleTest};

/// Hash that is identical on every platform and process: the first eight
/// bytes of the SHA-256 digest, read big-endian.
pub fn stable_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Pick an entry of a non-empty table by stable hash of `key`.
pub fn pick<'a, T>(table: &'a [T], key: &str) -> Option<&'a T> {
    if table.is_empty() {
        return None;
    }
    let index = (stable_hash(key) % table.len() as u64) as usize;
    table.get(index)
}

struct ChallengeTemplate {
    title: &'static str,
    description: &'static str,
    starter_python: &'static str,
    tests: &'static [(&'static str, &'static str)],
    hints: &'static [&'static str],
}

const CHALLENGES: &[ChallengeTemplate] = &[
    ChallengeTemplate {
        title: "Sum of a list",
        description: "Write a function `solve(numbers)` that returns the sum of the integers in the list.",
        starter_python: "def solve(numbers):\n    pass\n",
        tests: &[("[1, 2, 3]", "6"), ("[]", "0"), ("[-4, 4, 10]", "10")],
        hints: &["Start from 0 and add each element.", "An empty list sums to 0."],
    },
    ChallengeTemplate {
        title: "Reverse a string",
        description: "Write a function `solve(text)` that returns the characters of `text` in reverse order.",
        starter_python: "def solve(text):\n    pass\n",
        tests: &[("\"abc\"", "\"cba\""), ("\"\"", "\"\""), ("\"level\"", "\"level\"")],
        hints: &["Walk the string from the last index to the first."],
    },
    ChallengeTemplate {
        title: "Count vowels",
        description: "Write a function `solve(text)` that counts the vowels (a, e, i, o, u) in `text`, ignoring case.",
        starter_python: "def solve(text):\n    pass\n",
        tests: &[("\"Hello\"", "2"), ("\"rhythm\"", "0"), ("\"AEIOU\"", "5")],
        hints: &["Lowercase the text first.", "Check membership in a set of vowels."],
    },
    ChallengeTemplate {
        title: "Largest element",
        description: "Write a function `solve(numbers)` that returns the largest integer of a non-empty list.",
        starter_python: "def solve(numbers):\n    pass\n",
        tests: &[("[3, 9, 2]", "9"), ("[-5, -1, -7]", "-1"), ("[4]", "4")],
        hints: &["Keep the best value seen so far while iterating."],
    },
    ChallengeTemplate {
        title: "FizzBuzz value",
        description: "Write a function `solve(n)` that returns \"Fizz\" for multiples of 3, \"Buzz\" for multiples of 5, \"FizzBuzz\" for both and the number as a string otherwise.",
        starter_python: "def solve(n):\n    pass\n",
        tests: &[("3", "\"Fizz\""), ("10", "\"Buzz\""), ("15", "\"FizzBuzz\""), ("7", "\"7\"")],
        hints: &["Test the combined case first."],
    },
    ChallengeTemplate {
        title: "Palindrome check",
        description: "Write a function `solve(text)` that returns true when `text` reads the same forwards and backwards.",
        starter_python: "def solve(text):\n    pass\n",
        tests: &[("\"radar\"", "true"), ("\"rust\"", "false"), ("\"\"", "true")],
        hints: &["Compare the text with its reverse."],
    },
];

fn starter_code(language: &str, python: &str) -> String {
    match language.to_lowercase().as_str() {
        "python" | "" => python.to_string(),
        "javascript" | "js" | "typescript" => "function solve(input) {\n  // your code\n}\n".to_string(),
        "rust" => "fn solve(input: &str) -> String {\n    todo!()\n}\n".to_string(),
        other => format!("// {other}\n// implement solve(input)\n"),
    }
}

/// Deterministic challenge for a lesson title.
pub fn challenge_for(lesson_title: &str, language: &str) -> CodeChallenge {
    // CHALLENGES is a non-empty const table
    let template = pick(CHALLENGES, lesson_title).unwrap_or(&CHALLENGES[0]);
    let language = if language.trim().is_empty() {
        "python"
    } else {
        language
    };
    CodeChallenge {
        title: template.title.to_string(),
        description: template.description.to_string(),
        language: language.to_string(),
        starter_code: starter_code(language, template.starter_python),
        sample_tests: template
            .tests
            .iter()
            .map(|(input, output)| SampleTest {
                input: input.to_string(),
                output: output.to_string(),
            })
            .collect(),
        hints: template.hints.iter().map(|h| h.to_string()).collect(),
    }
}
