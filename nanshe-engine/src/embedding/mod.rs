//! Text embeddings for retrieval and classification
//!
//! Provides the `Embedder` trait, the deterministic `HashedEmbedder`, the
//! provider-backed `RemoteEmbedder`, and `EmbeddingService`, which caches
//! results and falls back to hashing when the remote backend fails.

mod hashed;
mod remote;
mod service;

pub use hashed::HashedEmbedder;
pub use remote::RemoteEmbedder;
pub use service::EmbeddingService;

use async_trait::async_trait;

use crate::Result;

/// Trait for generating text embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an L2-normalized embedding of `dimension()` components
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Returns the dimensionality of generated embeddings
    fn dimension(&self) -> usize;
}

/// Compute cosine similarity between two vectors
///
/// Returns a value in [-1, 1]; 0 when either vector is zero or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Cosine similarity of `candidate` against `query`, folding the candidate
/// to the query's width when they differ (as the vector store does)
pub fn projected_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if candidate.is_empty() || candidate.iter().any(|x| !x.is_finite()) {
        return 0.0;
    }
    if candidate.len() == query.len() {
        cosine_similarity(query, candidate)
    } else {
        cosine_similarity(query, &project(candidate, query.len()))
    }
}

/// Scale to unit length in place; the zero vector is left as is
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Fold a vector into `dimension` components by summing index mod dimension
pub fn project(vector: &[f32], dimension: usize) -> Vec<f32> {
    let mut out = vec![0.0; dimension];
    if dimension == 0 {
        return out;
    }
    for (i, x) in vector.iter().enumerate() {
        out[i % dimension] += x;
    }
    normalize(&mut out);
    out
}

pub fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|x| *x == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_or_mismatched() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_projected_similarity_folds_wider_candidates() {
        let query = [1.0, 0.0];
        assert!((projected_similarity(&query, &[1.0, 0.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((projected_similarity(&query, &[0.0, 1.0, 0.0, 0.0])).abs() < 1e-6);
        assert_eq!(projected_similarity(&query, &[]), 0.0);
        assert_eq!(projected_similarity(&query, &[f32::NAN, 1.0]), 0.0);
    }

    #[test]
    fn test_project_sums_mod_dimension() {
        let projected = project(&[1.0, 2.0, 3.0, 4.0], 2);
        // [4, 6] normalized
        let norm = (16.0f32 + 36.0).sqrt();
        assert!((projected[0] - 4.0 / norm).abs() < 1e-6);
        assert!((projected[1] - 6.0 / norm).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert!(is_zero(&v));
    }
}
