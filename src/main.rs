mod cli;
mod commands;
mod mcp;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let is_serve = matches!(cli.command, Command::Serve { .. });
    let default_level = if is_serve { "info" } else { "warn" };

    // Logs go to stderr; stdout carries command output and the MCP protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Setup => commands::cmd_setup(cli.json),
        Command::Tables { source } => commands::cmd_tables(&source, cli.json),
        Command::Index { rag } => commands::cmd_index(&rag, cli.json),
        Command::Summary {
            query,
            source,
            sample_rows,
        } => commands::cmd_summary(&query, &source, sample_rows, cli.json),
        Command::Context { query, rag } => commands::cmd_context(&query, &rag, cli.json),
        Command::Prompt { query, rag } => commands::cmd_prompt(&query, &rag, cli.json),
        Command::Serve { rag } => commands::cmd_serve(&rag),
    }
}
