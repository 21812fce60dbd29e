use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::RagConfig;
use crate::db::DataSource;
use crate::error::RagError;
use crate::prompt::{self, Message};
use crate::rag::embeddings::Embedder;
use crate::rag::index::{ScoredChunk, VectorIndex};
use crate::rag::refresh::{build_index, RefreshController, RefreshReport};
use crate::rag::retriever::{self, RetrievedContext};
use crate::tables;
use crate::types::{StructuredSummary, TableCount};

/// Point-in-time view of the service for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub tables: Vec<String>,
    pub generation: u64,
    pub indexed_chunks: usize,
    pub dimension: usize,
    pub rebuilding: bool,
    pub config: RagConfig,
}

/// Structured and unstructured retrieval over one database.
///
/// The known tables are read once in [`new`](Self::new) and never change for the
/// lifetime of the service. Queries run concurrently against whichever index
/// snapshot is active; [`refresh`](Self::refresh) builds and swaps in a new one.
///
/// Builds embed with `embedder`; queries embed with `query_embedder`, which is the
/// same instance unless [`with_query_embedder`](Self::with_query_embedder) sets a
/// separate one. An embedder that serializes calls internally should get its own
/// query-side instance, otherwise queries queue behind the build's batches.
pub struct RagService {
    source: Arc<dyn DataSource>,
    embedder: Arc<dyn Embedder>,
    query_embedder: Arc<dyn Embedder>,
    tables: Vec<String>,
    config: RagConfig,
    controller: RefreshController,
}

impl std::fmt::Debug for RagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("tables", &self.tables)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RagService {
    /// Validate `config` and capture the known tables.
    ///
    /// Fails with [`RagError::DataSourceUnavailable`] if the table list can't be read.
    /// No index is built here; call [`refresh`](Self::refresh).
    pub fn new(
        source: Arc<dyn DataSource>,
        embedder: Arc<dyn Embedder>,
        config: RagConfig,
    ) -> Result<Self, RagError> {
        config.validate()?;
        let tables = source
            .table_names()
            .map_err(|e| RagError::DataSourceUnavailable(format!("{e:#}")))?;
        info!(count = tables.len(), tables = ?tables, "Available tables");

        Ok(Self {
            source,
            query_embedder: Arc::clone(&embedder),
            embedder,
            tables,
            config,
            controller: RefreshController::new(),
        })
    }

    /// Embed queries with `query_embedder` instead of the build embedder.
    ///
    /// Both must produce vectors of the same dimension.
    pub fn with_query_embedder(
        mut self,
        query_embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let expected = self.embedder.dimension();
        let actual = query_embedder.dimension();
        if expected != actual {
            return Err(RagError::DimensionMismatch { expected, actual });
        }
        self.query_embedder = query_embedder;
        Ok(self)
    }

    pub fn known_tables(&self) -> &[String] {
        &self.tables
    }

    /// The snapshot currently served, if any.
    pub fn active_index(&self) -> Option<Arc<VectorIndex>> {
        self.controller.current()
    }

    /// Retrieved context for `query`, or the "no context" sentinel.
    pub fn retrieve_context(&self, query: &str) -> String {
        self.retrieve(query).context
    }

    /// Context and the scored chunks behind it, read from one snapshot.
    pub fn retrieve(&self, query: &str) -> RetrievedContext {
        let index = self.controller.current();
        retriever::retrieve_scored(
            query,
            index.as_deref(),
            self.query_embedder.as_ref(),
            self.config.top_k,
            self.config.context_char_limit,
        )
    }

    /// Scored top-k chunks for `query`, without joining or truncation.
    /// Returns an empty list while no index exists.
    pub fn search(&self, query: &str) -> Result<Vec<ScoredChunk>, RagError> {
        match self.controller.current() {
            Some(index) => {
                retriever::search(query, &index, self.query_embedder.as_ref(), self.config.top_k)
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn get_structured_summary(&self, query: &str) -> Result<StructuredSummary, RagError> {
        tables::match_tables(
            query,
            &self.tables,
            self.source.as_ref(),
            self.config.sample_row_limit,
        )
    }

    /// Exact row count for every known table.
    pub fn table_counts(&self) -> Result<Vec<TableCount>, RagError> {
        tables::table_counts(&self.tables, self.source.as_ref())
    }

    /// Rebuild the index from the data source and publish it on success.
    pub fn refresh(&self) -> Result<RefreshReport, RagError> {
        self.controller.refresh(|| {
            build_index(
                self.source.as_ref(),
                &self.tables,
                self.embedder.as_ref(),
                &self.config,
            )
        })
    }

    /// Messages for the external model. Summary and context are gathered
    /// independently; a failure in either degrades that part only.
    pub fn prompt(&self, query: &str) -> Vec<Message> {
        let summary = self.get_structured_summary(query);
        if let Err(e) = &summary {
            tracing::warn!(error = %e, "structured summary failed, sending prompt without it");
        }
        let context = self.retrieve_context(query);
        prompt::build_messages(&summary, &context, query)
    }

    pub fn stats(&self) -> ServiceStats {
        let index = self.controller.current();
        ServiceStats {
            tables: self.tables.clone(),
            generation: self.controller.generation(),
            indexed_chunks: index.as_ref().map_or(0, |i| i.len()),
            dimension: index.as_ref().map_or(0, |i| i.dimension()),
            rebuilding: self.controller.is_rebuilding(),
            config: self.config.clone(),
        }
    }
}
