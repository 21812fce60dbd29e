use std::future::Future;
use std::sync::Arc;

use rmcp::schemars;
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tablerag::error::RagError;
use tablerag::service::RagService;

// ── Parameter types ──

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// Natural-language question about the database. A known table name as the
    /// first word selects that table for the structured summary.
    pub query: String,
}

fn mcp_err(msg: impl std::fmt::Display) -> McpError {
    McpError::internal_error(msg.to_string(), None)
}

/// Pipeline errors keep their kind so clients can tell them apart.
fn rag_err(err: RagError) -> McpError {
    McpError::internal_error(
        err.to_string(),
        Some(serde_json::json!({ "kind": err.kind() })),
    )
}

fn require_query(query: &str) -> Result<(), McpError> {
    if query.trim().is_empty() {
        return Err(McpError::invalid_params("query cannot be empty", None));
    }
    Ok(())
}

fn json_text<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| mcp_err(format!("serialization failed: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ── MCP Server ──

#[derive(Clone)]
pub struct TableRagServer {
    tool_router: ToolRouter<Self>,
    /// Shared pipeline; every tool call borrows the active index snapshot.
    service: Arc<RagService>,
}

#[tool_router]
impl TableRagServer {
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    /// Semantic context for a question.
    #[tool(
        description = "Retrieve database rows semantically related to a question. Returns the joined context (truncated to the configured character limit) and the scored chunks it came from. Returns 'No context available.' when no index has been built."
    )]
    async fn tablerag_context(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = params.query;
        let service = Arc::clone(&self.service);

        tokio::task::spawn_blocking(move || {
            require_query(&query)?;
            debug!(query = %query, "context");
            json_text(&service.retrieve(&query))
        })
        .await
        .map_err(|e| mcp_err(format!("task join failed: {e}")))?
    }

    /// Structured summary for a question.
    #[tool(
        description = "Structured facts straight from the database. If the question's first word is a table name, returns that table's exact row count and sample rows; otherwise returns the row count of every table."
    )]
    async fn tablerag_summary(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = params.query;
        let service = Arc::clone(&self.service);

        tokio::task::spawn_blocking(move || {
            require_query(&query)?;
            debug!(query = %query, "summary");
            let summary = service.get_structured_summary(&query).map_err(rag_err)?;
            json_text(&summary)
        })
        .await
        .map_err(|e| mcp_err(format!("task join failed: {e}")))?
    }

    /// Prompt messages for an external model.
    #[tool(
        description = "Assemble the role-tagged messages (system instruction, database info, retrieved context, question) to send to a language model."
    )]
    async fn tablerag_prompt(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = params.query;
        let service = Arc::clone(&self.service);

        tokio::task::spawn_blocking(move || {
            require_query(&query)?;
            debug!(query = %query, "prompt");
            json_text(&service.prompt(&query))
        })
        .await
        .map_err(|e| mcp_err(format!("task join failed: {e}")))?
    }

    /// Rebuild the vector index.
    #[tool(
        description = "Rebuild the vector index from the current database contents. Queries keep using the previous index until the new one is ready. Concurrent refresh requests share one rebuild."
    )]
    async fn tablerag_refresh(&self) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);

        tokio::task::spawn_blocking(move || {
            debug!("refresh");
            let report = service.refresh().map_err(rag_err)?;
            json_text(&report)
        })
        .await
        .map_err(|e| mcp_err(format!("task join failed: {e}")))?
    }

    /// Index statistics.
    #[tool(
        description = "Show known tables, index generation, indexed chunk count, vector dimension, whether a rebuild is running, and the active configuration."
    )]
    async fn tablerag_stats(&self) -> Result<CallToolResult, McpError> {
        debug!("stats");
        json_text(&self.service.stats())
    }
}

#[tool_handler]
impl ServerHandler for TableRagServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "tablerag".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "tablerag answers questions about a SQLite database. It keeps a vector \
                 index of sampled rows for semantic context and reads exact counts and \
                 sample rows straight from the database.\n\n\
                  Workflow:\n\
                  1. Use tablerag_summary for exact row counts. Start the question with a table name to get its sample rows.\n\
                  2. Use tablerag_context for rows related to a question by meaning.\n\
                  3. Use tablerag_prompt to get both, assembled as messages for a model.\n\
                  4. Run tablerag_refresh after the database changes; tablerag_stats shows the index generation."
                    .into(),
            ),
        }
    }
}

/// Build the first index, then serve over stdio. A failed build is logged and
/// the server starts anyway; context requests answer with the sentinel until a
/// refresh succeeds.
pub async fn run_server(service: Arc<RagService>) -> anyhow::Result<()> {
    info!("starting tablerag MCP server v{}", env!("CARGO_PKG_VERSION"));

    let initial = Arc::clone(&service);
    match tokio::task::spawn_blocking(move || initial.refresh()).await? {
        Ok(report) => info!(
            chunks = report.chunks,
            tables = report.tables,
            elapsed_ms = report.elapsed_ms,
            "initial index ready"
        ),
        Err(e) => warn!(error = %e, "initial index build failed, serving without context"),
    }

    let server = TableRagServer::new(service);
    let running = server.serve(stdio()).await?;
    running.waiting().await?;

    info!("tablerag MCP server stopped");
    Ok(())
}
