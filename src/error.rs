use thiserror::Error;

/// Failures of the retrieval pipeline.
///
/// Build-time variants (`EmptyCorpus`, `Embedding`, `DataSource`) abort a rebuild
/// without touching the served snapshot. `QueryEmbedding` only ever affects a
/// single request. The type is `Clone` so one rebuild outcome can be handed to
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RagError {
    /// The database could not be opened or probed at startup.
    #[error("data source unavailable: {0}")]
    DataSourceUnavailable(String),

    /// A read against the data source failed mid-operation.
    #[error("data source read failed: {0}")]
    DataSource(String),

    /// No known tables, or every table sampled zero rows.
    #[error("empty corpus: {0}")]
    EmptyCorpus(String),

    /// A corpus chunk could not be embedded; the whole build is abandoned.
    #[error("embedding failed for chunk {chunk}: {reason}")]
    Embedding { chunk: usize, reason: String },

    /// The text of a live query could not be embedded.
    #[error("query embedding failed: {0}")]
    QueryEmbedding(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RagError {
    /// Wrap a collaborator read failure, keeping the full `anyhow` context chain.
    pub fn data_source(err: &anyhow::Error) -> Self {
        Self::DataSource(format!("{err:#}"))
    }

    /// Short machine-friendly name of the variant, used in JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataSourceUnavailable(_) => "data_source_unavailable",
            Self::DataSource(_) => "data_source",
            Self::EmptyCorpus(_) => "empty_corpus",
            Self::Embedding { .. } => "embedding",
            Self::QueryEmbedding(_) => "query_embedding",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
