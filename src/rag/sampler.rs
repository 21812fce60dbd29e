use tracing::debug;

use crate::db::DataSource;
use crate::error::RagError;
use crate::types::Row;

/// Text rendering of every sampled row, one row per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    pub text: String,
    pub tables: usize,
    pub rows: usize,
}

/// Render a row as `Table: <name>, <col>: <value>, ...`.
pub fn render_row(table: &str, row: &Row) -> String {
    let mut line = format!("Table: {table}");
    for (column, value) in row.columns() {
        line.push_str(&format!(", {column}: {value}"));
    }
    line
}

/// Sample up to `rows_per_table` rows from each table and join their renderings.
///
/// Fails with [`RagError::EmptyCorpus`] when there are no tables or every table is
/// empty, and with [`RagError::DataSource`] on the first failed read.
pub fn build_corpus(
    source: &dyn DataSource,
    tables: &[String],
    rows_per_table: usize,
) -> Result<Corpus, RagError> {
    if tables.is_empty() {
        return Err(RagError::EmptyCorpus("no tables found in the database".into()));
    }

    let mut lines = Vec::new();
    for table in tables {
        let rows = source
            .sample_rows(table, rows_per_table)
            .map_err(|e| RagError::data_source(&e))?;
        debug!(table = %table, rows = rows.len(), "sampled table");
        lines.extend(rows.iter().map(|row| render_row(table, row)));
    }

    if lines.is_empty() {
        return Err(RagError::EmptyCorpus(format!(
            "{} table(s) sampled but no rows found",
            tables.len()
        )));
    }

    Ok(Corpus {
        rows: lines.len(),
        tables: tables.len(),
        text: lines.join("\n"),
    })
}
