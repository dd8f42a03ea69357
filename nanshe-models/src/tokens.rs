//! Token counting for usage logging.
//!
//! Providers usually report exact counts; these are used only when they do
//! not. Known model families are counted with their BPE encoding, anything
//! else by whitespace splitting.

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Families encoded with `o200k_base`.
const O200K_FAMILIES: &[&str] = &["gpt-4o", "gpt-4.1", "o1", "o3", "o4"];

/// Families encoded with `cl100k_base`. Gemini has no public BPE table and
/// is counted with this one.
const CL100K_FAMILIES: &[&str] = &["gpt-4", "gpt-3.5", "text-embedding-", "gemini-"];

static O200K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| load("o200k_base", tiktoken_rs::o200k_base));
static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| load("cl100k_base", tiktoken_rs::cl100k_base));

fn load<E: std::fmt::Display>(name: &str, build: fn() -> Result<CoreBPE, E>) -> Option<CoreBPE> {
    build()
        .inspect_err(|e| warn!(encoding = name, error = %e, "BPE encoding unavailable"))
        .ok()
}

fn encoding_for(model: &str) -> Option<&'static CoreBPE> {
    let bare = model.split_once(':').map(|(_, m)| m).unwrap_or(model);
    if O200K_FAMILIES.iter().any(|f| bare.starts_with(f)) {
        O200K.as_ref()
    } else if CL100K_FAMILIES.iter().any(|f| bare.starts_with(f)) {
        CL100K.as_ref()
    } else {
        None
    }
}

/// Number of tokens `text` costs on `model`.
pub fn count_tokens(model: &str, text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    match encoding_for(model) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        None => text.split_whitespace().count() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_family_uses_bpe() {
        // "hello world" is two tokens in both encodings
        assert_eq!(count_tokens("gpt-4o-mini", "hello world"), 2);
        assert_eq!(count_tokens("openai:gpt-4-turbo", "hello world"), 2);
        assert_eq!(count_tokens("gemini:gemini-1.5-flash", "hello world"), 2);
    }

    #[test]
    fn bpe_differs_from_word_count() {
        let text = "unbelievably-hyphenated_identifiers";
        assert!(count_tokens("gpt-4o", text) > 1);
        assert_eq!(count_tokens("ollama:llama3", text), 1);
    }

    #[test]
    fn prefix_selects_encoding() {
        assert!(encoding_for("openai:o3-mini").is_some());
        assert!(encoding_for("text-embedding-3-small").is_some());
        assert!(encoding_for("ollama:mistral").is_none());
    }

    #[test]
    fn unknown_model_counts_words() {
        assert_eq!(count_tokens("ollama:llama3", "one two  three"), 3);
    }

    #[test]
    fn empty_text_is_free() {
        assert_eq!(count_tokens("gpt-4o", ""), 0);
    }
}
