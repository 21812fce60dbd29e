use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use tablerag::config::RagConfig;

#[derive(Debug, Parser)]
#[command(name = "tablerag")]
#[command(about = "Ask questions about a database: row counts, sample rows, and semantic context.")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

/// Embedding backend used to vectorize chunks and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Local ONNX model (bge-small-en-v1.5), downloaded on first use
    Fastembed,
    /// Deterministic token hashing, no model needed
    Hash,
}

/// Database location.
#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    /// Path to the SQLite database
    #[arg(long, env = "TABLERAG_DB")]
    pub db: PathBuf,
}

/// Database location plus retrieval tuning.
#[derive(Debug, Clone, Args)]
pub struct RagArgs {
    #[command(flatten)]
    pub source: DbArgs,

    /// Embedding backend
    #[arg(long, value_enum, default_value = "fastembed")]
    pub embedder: EmbedderKind,

    /// Maximum characters of retrieved context (default: 300)
    #[arg(long)]
    pub context_chars: Option<usize>,

    /// Sample rows returned for a matched table (default: 5)
    #[arg(long)]
    pub sample_rows: Option<usize>,

    /// Rows read per table when building the index (default: 100)
    #[arg(long)]
    pub rows_per_table: Option<usize>,

    /// Maximum characters per chunk (default: 1000)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks (default: 0)
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Chunks retrieved per query (default: 2)
    #[arg(long)]
    pub top_k: Option<usize>,
}

impl RagArgs {
    /// Defaults overridden by whichever flags were given.
    pub fn rag_config(&self) -> RagConfig {
        let defaults = RagConfig::default();
        RagConfig {
            context_char_limit: self.context_chars.unwrap_or(defaults.context_char_limit),
            sample_row_limit: self.sample_rows.unwrap_or(defaults.sample_row_limit),
            rows_per_table: self.rows_per_table.unwrap_or(defaults.rows_per_table),
            chunk_max_len: self.chunk_size.unwrap_or(defaults.chunk_max_len),
            chunk_overlap: self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            top_k: self.top_k.unwrap_or(defaults.top_k),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the embedding model
    Setup,

    /// List known tables with their row counts
    Tables {
        #[command(flatten)]
        source: DbArgs,
    },

    /// Build the vector index once and report what was indexed
    Index {
        #[command(flatten)]
        rag: RagArgs,
    },

    /// Structured summary for a question (matched table or all row counts)
    Summary {
        /// Question; a known table name as the first word selects that table
        query: String,

        #[command(flatten)]
        source: DbArgs,

        /// Sample rows returned for a matched table (default: 5)
        #[arg(long)]
        sample_rows: Option<usize>,
    },

    /// Retrieve semantic context for a question
    Context {
        /// Question to retrieve context for
        query: String,

        #[command(flatten)]
        rag: RagArgs,
    },

    /// Assemble the messages that would be sent to the language model
    Prompt {
        /// Question to answer
        query: String,

        #[command(flatten)]
        rag: RagArgs,
    },

    /// Start MCP server over stdio
    Serve {
        #[command(flatten)]
        rag: RagArgs,
    },
}
