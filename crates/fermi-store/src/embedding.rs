//! Embedding Model for Text Vectorization
//!
//! Text-to-vector conversion for the in-memory search index. The default
//! model is a feature-hashing bag of words: each token is hashed into one of
//! `dimension` buckets and the resulting vector is L2-normalized, so texts
//! sharing vocabulary score high under cosine similarity without any model
//! files.
//!
//! # Examples
//!
//! ```rust
//! use fermi_store::embedding::{cosine_similarity, EmbeddingModel, HashedEmbeddingModel};
//!
//! let model = HashedEmbeddingModel::new(256);
//! let a = model.embed("Seoul restaurant count").unwrap();
//! let b = model.embed("number of restaurants in Seoul").unwrap();
//! let c = model.embed("B2B SaaS churn rate").unwrap();
//! assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors that can occur during embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Invalid input text
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Trait for embedding models
pub trait EmbeddingModel {
    /// Generate an embedding vector for the given text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the dimension of embeddings produced by this model
    fn dimension(&self) -> usize;
}

/// Feature-hashing bag-of-words embedding
///
/// Tokens are lowercased alphanumeric runs (any script). A trailing
/// plural `s` is dropped from ASCII tokens longer than three characters so
/// "restaurants" and "restaurant" share a bucket.
pub struct HashedEmbeddingModel {
    dimension: usize,
}

impl HashedEmbeddingModel {
    /// Create a model producing `dimension`-sized vectors
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| {
                let lower = t.to_lowercase();
                if lower.is_ascii() && lower.len() > 3 && lower.ends_with('s') {
                    lower[..lower.len() - 1].to_string()
                } else {
                    lower
                }
            })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let index = (hash % self.dimension as u64) as usize;
        // High bit picks the sign to reduce collision bias
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for HashedEmbeddingModel {
    fn default() -> Self {
        Self::new(512)
    }
}

impl EmbeddingModel for HashedEmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embedding = vec![0.0f32; self.dimension];
        let mut any = false;
        for token in Self::tokens(text) {
            let (index, sign) = self.bucket(&token);
            embedding[index] += sign;
            any = true;
        }
        if !any {
            return Err(EmbeddingError::InvalidInput(
                "Text has no tokens to embed".to_string(),
            ));
        }

        // Normalize to unit length for cosine similarity
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_and_normalized() {
        let model = HashedEmbeddingModel::new(128);
        let a = model.embed("Seoul restaurant count").unwrap();
        let b = model.embed("Seoul restaurant count").unwrap();
        assert_eq!(a, b);
        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_identical_texts_score_one() {
        let model = HashedEmbeddingModel::default();
        let a = model.embed("employees").unwrap();
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_plural_insensitive() {
        let model = HashedEmbeddingModel::default();
        let a = model.embed("Restaurants").unwrap();
        let b = model.embed("restaurant").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_rejected() {
        let model = HashedEmbeddingModel::default();
        assert!(model.embed("  ?! ").is_err());
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
