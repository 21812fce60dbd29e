use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A scalar cell value read from the data source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                serializer.serialize_str(&hex)
            }
        }
    }
}

impl From<rusqlite::types::ValueRef<'_>> for Value {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// One row snapshot from a table: column name → value, in column order.
///
/// Serializes as a JSON object whose keys keep the column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Append a column (builder-style).
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.columns.push((name.into(), value));
        self
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Look up a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Exact row count of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub row_count: u64,
}

/// Structured answer derived directly from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredSummary {
    /// The query's first token named a known table.
    Table {
        table: String,
        row_count: u64,
        sample_data: Vec<Row>,
    },
    /// No table matched: row counts for every known table, in known-table order.
    AllTables { summary: Vec<TableCount> },
}

impl StructuredSummary {
    /// Name of the matched table, if any.
    pub fn matched_table(&self) -> Option<&str> {
        match self {
            StructuredSummary::Table { table, .. } => Some(table),
            StructuredSummary::AllTables { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct RowCountEntry {
    row_count: u64,
}

/// `{"<table>": {"row_count": n}, ...}` keyed in slice order.
struct SummaryMap<'a>(&'a [TableCount]);

impl Serialize for SummaryMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for count in self.0 {
            map.serialize_entry(
                &count.table,
                &RowCountEntry {
                    row_count: count.row_count,
                },
            )?;
        }
        map.end()
    }
}

impl Serialize for StructuredSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StructuredSummary::Table {
                table,
                row_count,
                sample_data,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("table", table)?;
                map.serialize_entry("row_count", row_count)?;
                map.serialize_entry("sample_data", sample_data)?;
                map.end()
            }
            StructuredSummary::AllTables { summary } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("summary", &SummaryMap(summary))?;
                map.end()
            }
        }
    }
}
