//! Embedding trait, the default feature-based embedder, and vector utilities.
//!
//! Any deterministic `text → fixed-length vector` function can back the
//! store: implement [`Embedder`] and hand it to
//! [`InMemoryStore::new`](crate::store::memory::InMemoryStore::new).
//! [`FeatureEmbedder`] is the default and needs no model files.

use crate::error::EmbeddingError;

/// Default embedding dimensionality.
pub const DEFAULT_DIMS: usize = 384;

/// Smallest dimensionality [`FeatureEmbedder`] accepts: the fixed feature
/// blocks plus room for hashed word slots.
pub const MIN_FEATURE_DIMS: usize = 128;

/// Trait for embedding backends.
///
/// Implementations must be pure: the same text yields the same vector on
/// every call and on every instance, and every vector has length
/// [`dims`](Embedder::dims).
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"feature-v1"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// The most frequent letter bigrams in English text.
const COMMON_BIGRAMS: [&str; 40] = [
    "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd", "ti", "es", "or", "te", "of",
    "ed", "is", "it", "al", "ar", "st", "to", "nt", "ng", "se", "ha", "as", "ou", "io", "le",
    "ve", "co", "me", "de", "hi", "ri", "ro", "ic", "ne", "ea",
];

const PUNCTUATION: &str = ".,!?;:'\"-()[]{}/&";

const CHAR_BLOCK: usize = 36;
const BIGRAM_BLOCK: usize = COMMON_BIGRAMS.len();
const WORD_SHAPE_BLOCK: usize = 2;
const PUNCT_BLOCK: usize = 17;
const FIXED_BLOCKS: usize = CHAR_BLOCK + BIGRAM_BLOCK + WORD_SHAPE_BLOCK + PUNCT_BLOCK;

/// Deterministic lexical-statistics embedder.
///
/// # Layout
///
/// | Slots | Feature |
/// |-------|---------|
/// | 0–35 | character frequency over `a–z0–9` (case-folded) |
/// | 36–75 | frequency of 40 common English bigrams |
/// | 76 | average word length / 10 |
/// | 77 | word density (words per character) |
/// | 78–94 | per-symbol punctuation frequency |
/// | 95– | hashed word frequency (FNV-1a) |
///
/// Frequencies are divided by the text length in characters, so vectors of
/// short and long texts have comparable magnitudes.
#[derive(Debug, Clone)]
pub struct FeatureEmbedder {
    dims: usize,
}

impl FeatureEmbedder {
    /// Create an embedder producing `dims`-length vectors.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Failed`] if `dims < MIN_FEATURE_DIMS`.
    pub fn new(dims: usize) -> Result<Self, EmbeddingError> {
        if dims < MIN_FEATURE_DIMS {
            return Err(EmbeddingError::Failed(format!(
                "feature embedder needs at least {} dimensions, got {}",
                MIN_FEATURE_DIMS, dims
            )));
        }
        Ok(Self { dims })
    }
}

impl Default for FeatureEmbedder {
    fn default() -> Self {
        Self { dims: DEFAULT_DIMS }
    }
}

impl Embedder for FeatureEmbedder {
    fn model_name(&self) -> &str {
        "feature-v1"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dims];
        let total = text.chars().count();
        if total == 0 {
            return Ok(vector);
        }
        let unit = 1.0 / total as f32;
        let lower: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

        for c in &lower {
            if let Some(i) = ALPHABET.find(*c) {
                vector[i] += unit;
            }
        }

        let offset = CHAR_BLOCK;
        for pair in lower.windows(2) {
            let mut buf = [0u8; 8];
            let a = pair[0].encode_utf8(&mut buf).len();
            let b = pair[1].encode_utf8(&mut buf[a..]).len();
            let bigram = std::str::from_utf8(&buf[..a + b]).unwrap_or("");
            if let Some(i) = COMMON_BIGRAMS.iter().position(|g| *g == bigram) {
                vector[offset + i] += unit;
            }
        }

        let words = split_words(&lower);
        let offset = CHAR_BLOCK + BIGRAM_BLOCK;
        if !words.is_empty() {
            let letters: usize = words.iter().map(|w| w.chars().count()).sum();
            vector[offset] = letters as f32 / words.len() as f32 / 10.0;
            vector[offset + 1] = words.len() as f32 * unit;
        }

        let offset = CHAR_BLOCK + BIGRAM_BLOCK + WORD_SHAPE_BLOCK;
        for c in text.chars() {
            if let Some(i) = PUNCTUATION.find(c) {
                vector[offset + i] += unit;
            }
        }

        let width = self.dims - FIXED_BLOCKS;
        for word in &words {
            let slot = (fnv1a(word.as_bytes()) % width as u64) as usize;
            vector[FIXED_BLOCKS + slot] += unit;
        }

        Ok(vector)
    }
}

fn split_words(chars: &[char]) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for &c in chars {
        if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// 64-bit FNV-1a; stable across platforms and releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_exactly_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_feature_embedder_dims_and_determinism() {
        let a = FeatureEmbedder::default();
        let b = FeatureEmbedder::default();
        let text = "The quick brown fox jumps over the lazy dog. 42!";
        let va = a.embed(text).unwrap();
        let vb = b.embed(text).unwrap();
        assert_eq!(va.len(), DEFAULT_DIMS);
        assert_eq!(va, vb);
        assert!((cosine_similarity(&va, &va) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_feature_embedder_empty_text_is_zero() {
        let v = FeatureEmbedder::default().embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_feature_embedder_rejects_small_dims() {
        assert!(FeatureEmbedder::new(16).is_err());
        assert_eq!(FeatureEmbedder::new(256).unwrap().dims(), 256);
    }

    #[test]
    fn test_length_normalization() {
        let e = FeatureEmbedder::default();
        let short = e.embed("rust ownership").unwrap();
        let long = e.embed(&"rust ownership ".repeat(20)).unwrap();
        let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
        let ratio = norm(&long) / norm(&short);
        assert!(ratio > 0.5 && ratio < 2.0, "ratio = {}", ratio);
        assert!(cosine_similarity(&short, &long) > 0.9);
    }

    #[test]
    fn test_shared_vocabulary_ranks_higher() {
        let e = FeatureEmbedder::default();
        let q = e.embed("What color is the sky?").unwrap();
        let sky = e.embed("The sky is blue.").unwrap();
        let grass = e.embed("Grass is green.").unwrap();
        assert!(cosine_similarity(&q, &sky) > cosine_similarity(&q, &grass));
    }

    #[test]
    fn test_disjoint_features_score_zero() {
        let e = FeatureEmbedder::default();
        let letters = e.embed("xyz").unwrap();
        let symbols = e.embed("...!!!").unwrap();
        assert_eq!(cosine_similarity(&letters, &symbols), 0.0);
    }
}
