//! Text embedding providers.
//!
//! [`FastEmbedProvider`] runs sentence-transformer models locally through
//! fastembed (ONNX runtime); the model is downloaded on first use.
//! [`HashEmbedder`] is a deterministic feature-hashing embedder that needs no
//! model files, for offline runs and tests.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::info;

use super::{EMBEDDING_DIM, HASH_MODEL};
use crate::error::{Error, Result};

/// A vector embedding
pub type Embedding = Vec<f32>;

/// Maps text to fixed-dimension vectors.
///
/// Calls may block. Implementations must be safe to call from several
/// threads at once and must return the same vector for the same text.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts in one call, preserving input order
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Build the provider named by a model identifier.
pub fn create_provider(model: &str) -> Result<Arc<dyn EmbeddingProvider>> {
    if model.eq_ignore_ascii_case(HASH_MODEL) {
        return Ok(Arc::new(HashEmbedder::default()));
    }
    Ok(Arc::new(FastEmbedProvider::new(model)?))
}

/// Local sentence-transformer embeddings via fastembed.
pub struct FastEmbedProvider {
    model: TextEmbedding,
    name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load a model by identifier (e.g. `all-MiniLM-L6-v2`).
    pub fn new(model: &str) -> Result<Self> {
        let (variant, dimension) = resolve_model(model)?;
        info!("Loading embedding model {} ({} dims)", model, dimension);

        let opts = InitOptions::new(variant).with_show_download_progress(false);
        let model_impl = TextEmbedding::try_new(opts)
            .map_err(|e| Error::Embedding(format!("failed to load {}: {}", model, e)))?;

        Ok(Self {
            model: model_impl,
            name: model.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.model
            .embed(vec![text], None)
            .map_err(|e| Error::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Map a model identifier to a fastembed model and its dimension.
fn resolve_model(model: &str) -> Result<(EmbeddingModel, usize)> {
    let normalized = model
        .trim()
        .trim_start_matches("sentence-transformers/")
        .trim_start_matches("BAAI/")
        .to_ascii_lowercase();

    match normalized.as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, EMBEDDING_DIM)),
        "all-minilm-l12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        _ => Err(Error::Config(format!(
            "unsupported embedding model: {}",
            model
        ))),
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embedder using FNV-1a feature hashing.
///
/// Each lowercase alphanumeric token is hashed into one bucket with a sign
/// taken from the hash, and the result is L2-normalized. Texts sharing words
/// score high, unrelated texts near zero.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_text(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASH_MODEL
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::similarity::cosine_similarity;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").unwrap().1, 384);
        assert_eq!(
            resolve_model("sentence-transformers/all-MiniLM-L6-v2")
                .unwrap()
                .1,
            384
        );
        assert_eq!(resolve_model("BAAI/bge-large-en-v1.5").unwrap().1, 1024);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = resolve_model("gpt-embedding-9000").unwrap_err();
        assert!(err.to_string().contains("unsupported embedding model"));
    }

    #[test]
    fn test_hash_model_selected_by_name() {
        let provider = create_provider("HASH").unwrap();
        assert_eq!(provider.model_name(), "hash");
        assert_eq!(provider.dimension(), EMBEDDING_DIM);
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("How do I pay my tax?").unwrap();
        let b = embedder.embed("How do I pay my tax?").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[test]
    fn test_hash_embedder_ignores_case_and_punctuation() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("pay tax").unwrap();
        let b = embedder.embed("PAY, tax!").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hash_embedder_related_texts_score_higher() {
        let embedder = HashEmbedder::default();
        let question = embedder.embed("How do I pay my property tax").unwrap();
        let related = embedder.embed("pay property tax").unwrap();
        let unrelated = embedder.embed("weather forecast tomorrow").unwrap();

        assert!(
            cosine_similarity(&question, &related) > cosine_similarity(&question, &unrelated)
        );
    }

    #[test]
    fn test_hash_embedder_batch_matches_single() {
        let embedder = HashEmbedder::new(64);
        let batch = embedder.embed_batch(&["one", "two words"]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("one").unwrap());
        assert_eq!(batch[1], embedder.embed("two words").unwrap());
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero() {
        let embedder = HashEmbedder::new(8);
        let v = embedder.embed("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
