use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RagError;

use super::embeddings::Embedder;
use super::index::{ScoredChunk, VectorIndex};

/// Returned in place of context when there is no index or the query can't be embedded.
pub const NO_CONTEXT: &str = "No context available.";

/// Embed `query` and return the `k` nearest chunks of `index`.
pub fn search(
    query: &str,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    k: usize,
) -> Result<Vec<ScoredChunk>, RagError> {
    let vector = embedder
        .embed(query)
        .map_err(|e| RagError::QueryEmbedding(format!("{e:#}")))?;
    index.query(&vector, k)
}

/// Joined context together with the scored chunks it was cut from.
///
/// Both halves always come from the same index snapshot and the same query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub context: String,
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievedContext {
    fn unavailable() -> Self {
        Self {
            context: NO_CONTEXT.to_string(),
            chunks: Vec::new(),
        }
    }
}

/// Top-`k` chunks for `query` and the context derived from them: chunk texts
/// joined with newlines, cut to the first `char_limit` characters.
///
/// Never fails. Without an index, or when the query can't be embedded, the context
/// is [`NO_CONTEXT`] and no chunks are returned.
pub fn retrieve_scored(
    query: &str,
    index: Option<&VectorIndex>,
    embedder: &dyn Embedder,
    k: usize,
    char_limit: usize,
) -> RetrievedContext {
    let Some(index) = index else {
        debug!("no index built yet, returning empty context");
        return RetrievedContext::unavailable();
    };

    match search(query, index, embedder, k) {
        Ok(chunks) => {
            debug!(hits = chunks.len(), k, "retrieved chunks");
            let joined = chunks
                .iter()
                .map(|hit| hit.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            RetrievedContext {
                context: truncate_chars(&joined, char_limit).to_string(),
                chunks,
            }
        }
        Err(e) => {
            warn!(error = %e, "retrieval failed, continuing without context");
            RetrievedContext::unavailable()
        }
    }
}

/// Context string for `query`; see [`retrieve_scored`].
pub fn retrieve(
    query: &str,
    index: Option<&VectorIndex>,
    embedder: &dyn Embedder,
    k: usize,
    char_limit: usize,
) -> String {
    retrieve_scored(query, index, embedder, k, char_limit).context
}

/// Prefix of `text` holding at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
