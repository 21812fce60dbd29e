use tracing::debug;

use crate::db::DataSource;
use crate::error::RagError;
use crate::types::{StructuredSummary, TableCount};

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First run of word characters (alphanumerics and `_`) in `query`.
pub fn first_token(query: &str) -> Option<&str> {
    let start = query.find(is_word_char)?;
    let rest = &query[start..];
    let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Known table named by the first token of `query`, compared case-sensitively.
///
/// Only the first token is inspected: "employees headcount" matches `employees`,
/// "show me employees" matches nothing.
pub fn matched_table<'a>(query: &str, known_tables: &'a [String]) -> Option<&'a str> {
    let token = first_token(query)?;
    known_tables
        .iter()
        .find(|table| table.as_str() == token)
        .map(String::as_str)
}

/// Structured summary for `query`.
///
/// A matched table yields its exact row count and up to `sample_limit` rows;
/// anything else yields the row count of every known table, in `known_tables` order.
pub fn match_tables(
    query: &str,
    known_tables: &[String],
    source: &dyn DataSource,
    sample_limit: usize,
) -> Result<StructuredSummary, RagError> {
    if let Some(table) = matched_table(query, known_tables) {
        debug!(table, "query names a known table");
        let row_count = source
            .row_count(table)
            .map_err(|e| RagError::data_source(&e))?;
        let sample_data = source
            .sample_rows(table, sample_limit)
            .map_err(|e| RagError::data_source(&e))?;
        return Ok(StructuredSummary::Table {
            table: table.to_string(),
            row_count,
            sample_data,
        });
    }

    table_counts(known_tables, source).map(|summary| StructuredSummary::AllTables { summary })
}

/// Exact row count of every table, in the given order.
pub fn table_counts(
    known_tables: &[String],
    source: &dyn DataSource,
) -> Result<Vec<TableCount>, RagError> {
    known_tables
        .iter()
        .map(|table| {
            let row_count = source
                .row_count(table)
                .map_err(|e| RagError::data_source(&e))?;
            Ok(TableCount {
                table: table.clone(),
                row_count,
            })
        })
        .collect()
}
