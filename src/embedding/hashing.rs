use async_trait::async_trait;

use super::{Embedder, EmbeddingError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Local feature-hashing embedder: lowercase word unigrams and bigrams are
/// hashed into a fixed number of signed buckets, then L2-normalized.
///
/// Needs no model server. Output is stable across processes and toolchains,
/// which persisted indices rely on.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing-{}", dimension),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            self.add_feature(&mut vector, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn vectors_are_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_text("Reset your password from the account page");
        let b = embedder.embed_text("Reset your password from the account page");

        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_text_scores_higher_than_unrelated_text() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("how do I reset my password");
        let related = embedder.embed_text("Question: How do I reset my password?");
        let unrelated = embedder.embed_text("Shipping to Norway takes five days");

        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed_text("  ...  "), vec![0.0; 8]);
        assert_eq!(embedder.model_id(), "hashing-8");
    }
}
