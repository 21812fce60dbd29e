use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::db::DataSource;
use crate::error::RagError;

use super::chunker;
use super::embeddings::Embedder;
use super::index::VectorIndex;
use super::sampler::build_corpus;

/// Maximum number of chunks sent to the embedder in one call.
const EMBED_CHUNK_SIZE: usize = 256;

/// What one build pass produced, before it is published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub tables: usize,
    pub rows_sampled: usize,
    pub corpus_chars: usize,
    pub chunks: usize,
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Snapshot number, starting at 1 for the first published index.
    pub generation: u64,
    pub tables: usize,
    pub rows_sampled: usize,
    pub corpus_chars: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub elapsed_ms: u64,
}

/// Run Sampler → Chunker → Embedder → VectorIndex without touching shared state.
pub fn build_index(
    source: &dyn DataSource,
    tables: &[String],
    embedder: &dyn Embedder,
    config: &RagConfig,
) -> Result<(VectorIndex, BuildStats), RagError> {
    let corpus = build_corpus(source, tables, config.rows_per_table)?;
    let chunks = chunker::split(&corpus.text, config.chunk_max_len, config.chunk_overlap);
    info!(
        tables = corpus.tables,
        rows = corpus.rows,
        chunks = chunks.len(),
        "Embedding corpus..."
    );

    let mut pairs = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(EMBED_CHUNK_SIZE).enumerate() {
        let offset = batch_no * EMBED_CHUNK_SIZE;
        let vectors = embed_chunk_batch(embedder, batch, offset)?;
        pairs.extend(batch.iter().cloned().zip(vectors));
    }

    let stats = BuildStats {
        tables: corpus.tables,
        rows_sampled: corpus.rows,
        corpus_chars: corpus.text.chars().count(),
        chunks: pairs.len(),
    };
    let index = VectorIndex::build(pairs)?;
    Ok((index, stats))
}

/// Embed one batch of chunks. `offset` is the position of `batch[0]` in the corpus.
///
/// If the batch call fails, falls back to one-at-a-time to find the bad chunk;
/// the first chunk that still fails aborts the build.
fn embed_chunk_batch(
    embedder: &dyn Embedder,
    batch: &[String],
    offset: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
    match embedder.embed_batch(&refs) {
        Ok(vectors) if vectors.len() == batch.len() => return Ok(vectors),
        Ok(vectors) => warn!(
            expected = batch.len(),
            got = vectors.len(),
            "Batch embedding returned wrong count, falling back to sequential"
        ),
        Err(e) => warn!(error = %e, "Batch embedding failed, falling back to sequential"),
    }

    batch
        .iter()
        .enumerate()
        .map(|(i, text)| {
            embedder.embed(text).map_err(|e| RagError::Embedding {
                chunk: offset + i,
                reason: format!("{e:#}"),
            })
        })
        .collect()
}

/// Owns the active index pointer and serializes rebuilds.
///
/// Readers call [`current`](Self::current), which only clones an `Arc` under a
/// read lock; the write lock is held just long enough to swap the pointer, never
/// while a build runs. Rebuilds are single-flight: a request that arrives while a
/// build is running waits for it and returns its outcome instead of building again.
#[derive(Default)]
pub struct RefreshController {
    active: RwLock<Option<Arc<VectorIndex>>>,
    /// Held for the duration of a build. Stores the last outcome for joiners.
    flight: Mutex<Option<Result<RefreshReport, RagError>>>,
    completed: AtomicU64,
    generation: AtomicU64,
    pending: AtomicUsize,
    rebuilding: AtomicBool,
}

/// Decrements the pending-refresh counter when a refresh call returns.
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Clears the rebuilding flag even if the build panics.
struct RebuildingGuard<'a>(&'a AtomicBool);

impl Drop for RebuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The snapshot currently served, if any build has succeeded.
    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generation of the served snapshot (0 before the first publish).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Refresh calls currently running or waiting on the running one.
    pub fn pending_refreshes(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run `build` and publish its index on success.
    ///
    /// On failure the served snapshot is left untouched and the error returned.
    pub fn refresh<F>(&self, build: F) -> Result<RefreshReport, RagError>
    where
        F: FnOnce() -> Result<(VectorIndex, BuildStats), RagError>,
    {
        let observed = self.completed.load(Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingGuard(&self.pending);

        let mut last = self.flight.lock().unwrap_or_else(PoisonError::into_inner);
        if self.completed.load(Ordering::SeqCst) != observed {
            if let Some(outcome) = last.as_ref() {
                debug!("joined in-flight refresh");
                return outcome.clone();
            }
        }

        self.rebuilding.store(true, Ordering::SeqCst);
        let _rebuilding = RebuildingGuard(&self.rebuilding);
        let started = Instant::now();
        info!("Rebuilding index...");

        let outcome = build().map(|(index, stats)| {
            let dimension = index.dimension();
            let generation = self.publish(index);
            RefreshReport {
                generation,
                tables: stats.tables,
                rows_sampled: stats.rows_sampled,
                corpus_chars: stats.corpus_chars,
                chunks: stats.chunks,
                dimension,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }
        });

        match &outcome {
            Ok(report) => info!(
                generation = report.generation,
                chunks = report.chunks,
                elapsed_ms = report.elapsed_ms,
                "Index published"
            ),
            Err(e) => warn!(error = %e, "Rebuild failed, keeping previous index"),
        }

        *last = Some(outcome.clone());
        self.completed.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Swap in a new snapshot and return its generation.
    fn publish(&self, index: VectorIndex) -> u64 {
        let index = Arc::new(index);
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = Some(index);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}
