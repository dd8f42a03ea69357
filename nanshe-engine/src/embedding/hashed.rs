//! Deterministic feature-hashing embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Embedder, normalize};
use crate::Result;

/// Character n-gram lengths extracted from each word.
const CHAR_NGRAMS: std::ops::RangeInclusive<usize> = 3..=5;

/// Embeds text by hashing words, word bigrams and character n-grams into
/// signed buckets. Identical text always yields the identical vector.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding; the zero vector when the text has no words.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for feature in features(text) {
            let (bucket, sign) = self.bucket(&feature);
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let index = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let sign = if digest[4] & 0x80 != 0 { -1.0 } else { 1.0 };
        (index as usize % self.dimension, sign)
    }
}

/// Lowercased words, word bigrams and per-word character n-grams.
fn features(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut out = Vec::new();
    for word in &words {
        out.push(format!("w:{word}"));
        let chars: Vec<char> = word.chars().collect();
        for n in CHAR_NGRAMS {
            for window in chars.windows(n) {
                out.push(format!("c:{}", window.iter().collect::<String>()));
            }
        }
    }
    for pair in words.windows(2) {
        out.push(format!("b:{} {}", pair[0], pair[1]));
    }
    out
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{cosine_similarity, is_zero};

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashedEmbedder::new(384);
        let a = embedder.embed_sync("Apprendre le japonais");
        let b = embedder.embed_sync("Apprendre le japonais");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashedEmbedder::new(128);
        assert_eq!(
            embedder.embed_sync("Learn Python!"),
            embedder.embed_sync("learn   python")
        );
    }

    #[test]
    fn test_empty_input_is_zero() {
        let embedder = HashedEmbedder::new(64);
        assert!(is_zero(&embedder.embed_sync("")));
        assert!(is_zero(&embedder.embed_sync("  ?! ")));
    }

    #[test]
    fn test_related_texts_are_closer() {
        let embedder = HashedEmbedder::new(384);
        let base = embedder.embed_sync("learn japanese language");
        let near = embedder.embed_sync("japanese language course");
        let far = embedder.embed_sync("organic chemistry reactions");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_feature_kinds() {
        let f = features("Hello big world");
        assert!(f.contains(&"w:hello".to_string()));
        assert!(f.contains(&"b:big world".to_string()));
        assert!(f.contains(&"c:hel".to_string()));
        assert!(f.contains(&"c:hello".to_string()));
        assert!(f.contains(&"c:big".to_string()));
    }
}
