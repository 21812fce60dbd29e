use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use tablerag::config::RagConfig;
use tablerag::db::{DataSource, Database};
use tablerag::error::RagError;
use tablerag::prompt::Role;
use tablerag::rag::embeddings::{Embedder, EmbeddingEngine, HashEmbedder};
use tablerag::rag::setup;
use tablerag::service::RagService;
use tablerag::tables;
use tablerag::types::{StructuredSummary, TableCount};

use crate::cli::{DbArgs, EmbedderKind, RagArgs};
use crate::mcp;

/// Open the database read-only. Failing here means nothing can ever be indexed.
fn open_db(args: &DbArgs) -> Result<Database> {
    let db = Database::open(&args.db)
        .map_err(|e| RagError::DataSourceUnavailable(format!("{e:#}")))?;
    info!(path = %args.db.display(), "Database connection successful");
    Ok(db)
}

fn load_engine() -> Result<EmbeddingEngine> {
    EmbeddingEngine::new()
        .context("Failed to load embedding model. Run 'tablerag setup' to download it.")
}

/// Build-side and query-side embedders. The ONNX engine serializes inference, so
/// queries get their own instance and never wait on a rebuild's batches.
fn load_embedders(kind: EmbedderKind) -> Result<(Arc<dyn Embedder>, Arc<dyn Embedder>)> {
    match kind {
        EmbedderKind::Fastembed => {
            info!("Loading embedding model...");
            let build: Arc<dyn Embedder> = Arc::new(load_engine()?);
            let query: Arc<dyn Embedder> = Arc::new(load_engine()?);
            Ok((build, query))
        }
        EmbedderKind::Hash => {
            let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
            Ok((Arc::clone(&embedder), embedder))
        }
    }
}

/// Open the database, load the embedders and capture the known tables.
pub fn open_service(args: &RagArgs) -> Result<RagService> {
    let db = open_db(&args.source)?;
    log_first_table_columns(&db);
    let (build, query) = load_embedders(args.embedder)?;
    let service =
        RagService::new(Arc::new(db), build, args.rag_config())?.with_query_embedder(query)?;
    Ok(service)
}

/// Column layout of the first table, at debug level.
fn log_first_table_columns(db: &Database) {
    let Ok(tables) = db.table_names() else {
        return;
    };
    let Some(first) = tables.first() else {
        return;
    };
    match db.columns(first) {
        Ok(columns) => {
            for col in columns {
                debug!(table = %first, column = %col.name, r#type = %col.declared_type, "column");
            }
        }
        Err(e) => debug!(table = %first, error = %e, "could not read columns"),
    }
}

/// Build the index, logging rather than failing: retrieval degrades to the
/// "no context" sentinel without one.
fn refresh_or_warn(service: &RagService) {
    if let Err(e) = service.refresh() {
        warn!(error = %e, "Could not build index, continuing without context");
    }
}

/// Print `data` as pretty JSON if `json` is true, otherwise call `human_fmt`.
fn output<T: Serialize>(data: &T, json: bool, human_fmt: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        human_fmt(data);
    }
    Ok(())
}

/// Download the embedding model.
pub fn cmd_setup(json: bool) -> Result<()> {
    let result = setup::download_model()?;
    output(&result, json, |r| {
        println!("Embedding model ready in {}", r.model_dir);
    })
}

/// List known tables with their row counts.
pub fn cmd_tables(source: &DbArgs, json: bool) -> Result<()> {
    let db = open_db(source)?;
    let names = db.table_names().context("Failed to list tables")?;
    let counts: Vec<TableCount> = tables::table_counts(&names, &db)?;

    output(&counts, json, |counts| {
        if counts.is_empty() {
            println!("No tables found");
            return;
        }
        for count in counts {
            println!("{:<32} {} rows", count.table, count.row_count);
        }
    })
}

/// Build the index once.
pub fn cmd_index(rag: &RagArgs, json: bool) -> Result<()> {
    let service = open_service(rag)?;
    let report = service.refresh()?;

    output(&report, json, |r| {
        println!(
            "Indexed {} rows from {} tables into {} chunks",
            r.rows_sampled, r.tables, r.chunks
        );
        println!(
            "  {} characters, {}-dim vectors, {} ms",
            r.corpus_chars, r.dimension, r.elapsed_ms
        );
    })
}

/// Structured summary for a question.
pub fn cmd_summary(
    query: &str,
    source: &DbArgs,
    sample_rows: Option<usize>,
    json: bool,
) -> Result<()> {
    let db = open_db(source)?;
    let names = db.table_names().context("Failed to list tables")?;
    let sample_limit = sample_rows.unwrap_or(RagConfig::default().sample_row_limit);
    let summary = tables::match_tables(query, &names, &db, sample_limit)?;

    output(&summary, json, |summary| match summary {
        StructuredSummary::Table {
            table,
            row_count,
            sample_data,
        } => {
            println!("{table}: {row_count} rows");
            for row in sample_data {
                let cells: Vec<String> = row
                    .columns()
                    .iter()
                    .map(|(col, value)| format!("{col}={value}"))
                    .collect();
                println!("  {}", cells.join("  "));
            }
        }
        StructuredSummary::AllTables { summary } => {
            for count in summary {
                println!("{:<32} {} rows", count.table, count.row_count);
            }
        }
    })
}

/// Retrieve semantic context for a question.
pub fn cmd_context(query: &str, rag: &RagArgs, json: bool) -> Result<()> {
    let service = open_service(rag)?;
    refresh_or_warn(&service);

    let retrieved = service.retrieve(query);

    output(&retrieved, json, |r| {
        println!("{}", r.context);
    })
}

/// Print the messages that would be sent to the language model.
pub fn cmd_prompt(query: &str, rag: &RagArgs, json: bool) -> Result<()> {
    let service = open_service(rag)?;
    refresh_or_warn(&service);
    let messages = service.prompt(query);

    output(&messages, json, |messages| {
        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
            };
            println!("[{role}] {}", message.content);
        }
    })
}

/// Start the MCP server.
pub fn cmd_serve(rag: &RagArgs) -> Result<()> {
    let service = Arc::new(open_service(rag)?);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(mcp::run_server(service))
}
