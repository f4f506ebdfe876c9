use crate::embed::Embedder;
use crate::error::EmbedError;

/// Default output dimension for [`HashEmbedder`].
pub const DEFAULT_HASH_DIM: usize = 256;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Deterministic local embedder.
///
/// Lowercased text is split into character trigrams (padded with two spaces
/// on each side) and whitespace-separated words; each feature is hashed with
/// FNV-1a into one of `dim` slots, words weighing twice as much as
/// trigrams. The result is L2-normalized. Empty text yields the zero vector.
///
/// The hash is stable across builds and platforms, so vectors persisted by
/// one binary stay comparable with vectors computed by another.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Create a hashing embedder. A zero `dim` falls back to the default.
    pub fn new(dim: usize) -> Self {
        Self {
            dim: if dim == 0 { DEFAULT_HASH_DIM } else { dim },
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return vector;
        }

        let padded: Vec<char> = format!("  {normalized}  ").chars().collect();
        for window in padded.windows(3) {
            let trigram: String = window.iter().collect();
            vector[self.slot(&trigram)] += 1.0;
        }
        for word in normalized.split_whitespace() {
            vector[self.slot(word)] += 2.0;
        }

        let norm = vector.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        if norm > 0.0 {
            let scale = (1.0 / norm) as f32;
            for x in &mut vector {
                *x *= scale;
            }
        }
        vector
    }

    fn slot(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dim as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn output_is_unit_length_and_deterministic() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("Senior Software Engineer");
        let b = e.embed_text("Senior Software Engineer");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_outer_whitespace_do_not_matter() {
        let e = HashEmbedder::default();
        assert_eq!(
            e.embed_text("  Product Manager "),
            e.embed_text("product manager")
        );
    }

    #[test]
    fn related_titles_score_higher_than_unrelated() {
        let e = HashEmbedder::default();
        let senior = e.embed_text("Senior Software Engineer");
        let sr = e.embed_text("Sr Software Engineer");
        let marketing = e.embed_text("Marketing Manager");
        assert!(cosine(&senior, &sr) > cosine(&senior, &marketing));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbedder::new(8);
        assert_eq!(e.embed_text("   "), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn batch_matches_single_calls() {
        let e = HashEmbedder::new(32);
        let batch = e.embed_batch(&["a b", "c"]).await.unwrap();
        assert_eq!(batch[0], e.embed("a b").await.unwrap());
        assert_eq!(batch[1], e.embed("c").await.unwrap());
    }
}
