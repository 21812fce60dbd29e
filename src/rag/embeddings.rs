use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};

use super::{model_cache_dir, EMBEDDING_DIM};

/// Batch size for fastembed internal sub-batching.
/// Smaller batches reduce padding waste when text lengths vary widely.
const EMBED_BATCH_SIZE: usize = 64;

/// Maps text to a fixed-dimension vector.
///
/// Implementations must be deterministic: the same text always yields the same
/// vector for the lifetime of the process.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Embedding engine wrapping a fastembed ONNX model.
///
/// Uses ONNX Runtime for inference. The quantized model (BGESmallENV15Q) is
/// ~2-3x faster than full precision with negligible quality loss.
/// Inference needs `&mut` access to the model, so it sits behind a mutex and
/// concurrent queries take turns.
pub struct EmbeddingEngine {
    model: Mutex<TextEmbedding>,
}

impl EmbeddingEngine {
    /// Create a new embedding engine using the quantized BGE-small-en-v1.5 model.
    ///
    /// Models are cached in the shared directory (see [`super::model_cache_dir`]).
    pub fn new() -> Result<Self> {
        Self::load(false)
    }

    /// Create a new embedding engine, showing download progress on stdout.
    pub fn new_with_progress() -> Result<Self> {
        Self::load(true)
    }

    fn load(show_progress: bool) -> Result<Self> {
        let model = TextEmbedding::try_new(
            TextInitOptions::new(EmbeddingModel::BGESmallENV15Q)
                .with_cache_dir(model_cache_dir())
                .with_show_download_progress(show_progress),
        )
        .context("Failed to initialize embedding model")?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for EmbeddingEngine {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding engine lock poisoned"))?;
        let results = model.embed(vec![text], Some(1)).context("Embedding failed")?;

        let vec = results
            .into_iter()
            .next()
            .context("No embedding returned")?;

        debug_assert_eq!(
            vec.len(),
            EMBEDDING_DIM,
            "Expected {EMBEDDING_DIM}-dim embedding, got {}",
            vec.len()
        );

        Ok(vec)
    }

    /// The model lock is taken per sub-batch of [`EMBED_BATCH_SIZE`] texts, so a
    /// caller sharing this engine waits for at most one sub-batch.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding engine lock poisoned"))?;
            let vectors = model
                .embed(batch, Some(EMBED_BATCH_SIZE))
                .context("Batch embedding failed")?;
            anyhow::ensure!(
                vectors.len() == batch.len(),
                "model returned {} embeddings for {} texts",
                vectors.len(),
                batch.len()
            );
            results.extend(vectors);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Feature-hashing bag-of-words embedder.
///
/// Deterministic and model-free: each lowercase alphanumeric token is hashed to a
/// signed bucket, and the result is L2-normalized. Not semantic, but texts that
/// share tokens land close together, which is enough for offline use and tests.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = vec![0.0f32; self.dim];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dim as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vec {
                *x /= norm;
            }
        }

        Ok(vec)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
