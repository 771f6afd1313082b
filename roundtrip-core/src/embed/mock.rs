use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Embedder, normalize};

/// Deterministic embedder for offline runs.
///
/// The text is hashed with BLAKE3, the digest is mixed with the configured
/// seed, and a ChaCha8 stream seeded from that value fills a unit-length
/// vector. Equal texts always map to equal vectors; distinct texts map to
/// nearly orthogonal ones at realistic dimensionalities.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    seed: u64,
}

impl MockEmbedder {
    pub fn new(dimensions: usize, seed: u64) -> Self {
        Self { dimensions, seed }
    }

    /// Synchronous form of [`Embedder::embed`]; never fails.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let digest = blake3::hash(text.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from_le_bytes(prefix) ^ self.seed);

        let mut v: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        normalize(&mut v);
        v
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Embedder for MockEmbedder {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::cosine_similarity;

    #[tokio::test]
    async fn same_text_same_vector() {
        let e = MockEmbedder::new(64, 42);
        let a = e.embed("Irregular heartbeat").await.unwrap();
        let b = e.embed("Irregular heartbeat").await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn seed_changes_vectors() {
        let a = MockEmbedder::new(64, 42).vector("text");
        let b = MockEmbedder::new(64, 7).vector("text");
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_texts_are_far_apart() {
        let e = MockEmbedder::new(1536, 42);
        let a = e.vector("Irregular heartbeat characterized by abnormal heart rhythm patterns");
        let b = e.vector("Medication that reduces heart rate and blood pressure");
        assert!(cosine_similarity(&a, &b) < 0.2);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn vectors_have_pinned_length_and_unit_norm(text in ".{0,64}", dims in 1usize..256) {
            let v = MockEmbedder::new(dims, 42).vector(&text);
            prop_assert_eq!(v.len(), dims);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-4);
        }
    }
}
