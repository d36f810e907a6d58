use std::sync::Arc;

use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Name of the built-in character n-gram embedder
pub const CHAR_NGRAM_MODEL: &str = "char-ngram";

/// Output dimension of the built-in embedder
pub const CHAR_NGRAM_DIM: usize = 256;

// Fixed seeds keep bucket assignment identical across builds and platforms
const UNIGRAM_SEED: u64 = 0x6765_6f31;
const BIGRAM_SEED: u64 = 0x6765_6f32;

/// Errors from the embedding capability
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model not found: {name}")]
    ModelNotFound { name: String },

    #[error("invalid embedding configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("embedding inference failed: {reason}")]
    InferenceFailed { reason: String },
}

/// Encodes text to a fixed-length vector
///
/// Implementations must be deterministic and return vectors of `dimension()`
/// length; the semantic retriever compares them with a dot product, so they
/// should be L2-normalized.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Resolve an embedding capability by its configured name
pub fn load_embedder(name: &str) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match name.trim() {
        CHAR_NGRAM_MODEL => {
            let embedder = CharNgramEmbedder::new(CHAR_NGRAM_DIM)?;
            tracing::info!(
                "Loaded embedding model {} (dim={})",
                CHAR_NGRAM_MODEL,
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        other => Err(EmbeddingError::ModelNotFound {
            name: other.to_string(),
        }),
    }
}

/// Hashed bag of character unigrams and bigrams
///
/// Captures surface overlap between address strings regardless of how they
/// were segmented, which is what the lexical index misses.
#[derive(Debug, Clone)]
pub struct CharNgramEmbedder {
    dim: usize,
}

impl CharNgramEmbedder {
    pub fn new(dim: usize) -> Result<Self, EmbeddingError> {
        if dim == 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: "dimension must be positive".to_string(),
            });
        }
        Ok(Self { dim })
    }

    fn bucket(&self, feature: &str, seed: u64) -> usize {
        (xxh3_64_with_seed(feature.as_bytes(), seed) % self.dim as u64) as usize
    }
}

impl Embedder for CharNgramEmbedder {
    fn name(&self) -> &str {
        CHAR_NGRAM_MODEL
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut vector = vec![0.0f32; self.dim];

        let mut buf = [0u8; 8];
        for ch in &chars {
            vector[self.bucket(ch.encode_utf8(&mut buf), UNIGRAM_SEED)] += 1.0;
        }

        let mut pair = String::with_capacity(8);
        for window in chars.windows(2) {
            pair.clear();
            pair.push(window[0]);
            pair.push(window[1]);
            vector[self.bucket(&pair, BIGRAM_SEED)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

/// Dot product of two equal-length vectors
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
