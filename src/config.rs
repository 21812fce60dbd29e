use serde::Serialize;

use crate::error::RagError;

/// Tunables for sampling, chunking and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagConfig {
    /// Maximum characters of retrieved context handed to the model.
    pub context_char_limit: usize,
    /// Sample rows returned with a matched-table summary.
    pub sample_row_limit: usize,
    /// Rows read from each table when building the corpus.
    pub rows_per_table: usize,
    /// Maximum characters per chunk.
    pub chunk_max_len: usize,
    /// Characters shared by consecutive chunks. Zero gives a strict partition.
    pub chunk_overlap: usize,
    /// Nearest chunks retrieved per query.
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            context_char_limit: 300,
            sample_row_limit: 5,
            rows_per_table: 100,
            chunk_max_len: 1000,
            chunk_overlap: 0,
            top_k: 2,
        }
    }
}

impl RagConfig {
    /// Reject settings the chunker and retriever cannot honor.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_max_len == 0 {
            return Err(RagError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_max_len {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_max_len
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig(
                "top-k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
