use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use crate::types::{Row, Value};

/// Read-only access to the tables the pipeline samples and summarizes.
pub trait DataSource: Send + Sync {
    /// Every user table, in a stable order.
    fn table_names(&self) -> Result<Vec<String>>;

    /// Exact number of rows in `table`.
    fn row_count(&self, table: &str) -> Result<u64>;

    /// Up to `limit` rows of `table`, in whatever order the source returns them.
    fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>>;
}

/// Column metadata as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
}

/// SQLite-backed [`DataSource`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open an existing database read-only and probe it with `SELECT 1`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Database health check failed")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an empty in-memory database (for tests and benchmarks).
    #[doc(hidden)]
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run raw SQL. Only used to seed fixtures; the pipeline itself never writes.
    #[doc(hidden)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?
            .execute_batch(sql)
            .context("Failed to execute SQL batch")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    /// Column names and declared types of `table`, in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read columns of {table}"))?;
        Ok(rows)
    }
}

impl DataSource for Database {
    fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to list tables")?;
        Ok(names)
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to count rows in {table}"))?;
        u64::try_from(count).with_context(|| format!("negative row count for {table}"))
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} LIMIT ?1", quote_ident(table)))
            .with_context(|| format!("Failed to prepare sample query for {table}"))?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = stmt
            .query_map(params![limit], |row| {
                let mut columns = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    columns.push((name.clone(), Value::from(row.get_ref(i)?)));
                }
                Ok(Row::new(columns))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to sample rows from {table}"))?;
        Ok(rows)
    }
}

/// Quote an SQL identifier, doubling any embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, salary REAL, badge BLOB);
             INSERT INTO employees VALUES (1, 'Ada', 120.5, X'0102');
             INSERT INTO employees VALUES (2, 'Grace', NULL, NULL);
             INSERT INTO employees VALUES (3, 'Linus', 99.0, NULL);
             CREATE TABLE departments (id INTEGER PRIMARY KEY, title TEXT);
             INSERT INTO departments VALUES (1, 'Research');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_table_names_sorted() {
        let db = seeded();
        assert_eq!(db.table_names().unwrap(), vec!["departments", "employees"]);
    }

    #[test]
    fn test_table_names_empty_database() {
        let db = Database::open_memory().unwrap();
        assert!(db.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_row_count() {
        let db = seeded();
        assert_eq!(db.row_count("employees").unwrap(), 3);
        assert_eq!(db.row_count("departments").unwrap(), 1);
    }

    #[test]
    fn test_row_count_unknown_table_fails() {
        let db = seeded();
        let err = db.row_count("ghosts").unwrap_err();
        assert!(format!("{err:#}").contains("ghosts"));
    }

    #[test]
    fn test_sample_rows_respects_limit_and_types() {
        let db = seeded();
        let rows = db.sample_rows("employees", 2).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        let names: Vec<&str> = first.columns().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "salary", "badge"]);
        assert_eq!(first.get("id"), Some(&Value::Integer(1)));
        assert_eq!(first.get("name"), Some(&Value::Text("Ada".into())));
        assert_eq!(first.get("salary"), Some(&Value::Real(120.5)));
        assert_eq!(first.get("badge"), Some(&Value::Blob(vec![1, 2])));
        assert_eq!(rows[1].get("salary"), Some(&Value::Null));
    }

    #[test]
    fn test_sample_rows_zero_limit() {
        let db = seeded();
        assert!(db.sample_rows("employees", 0).unwrap().is_empty());
    }

    #[test]
    fn test_quoted_table_names() {
        let db = Database::open_memory().unwrap();
        db.execute_batch(
            r#"CREATE TABLE "order items" (sku TEXT);
               INSERT INTO "order items" VALUES ('A-1');
               CREATE TABLE "we""ird" (x INTEGER);"#,
        )
        .unwrap();
        assert_eq!(db.row_count("order items").unwrap(), 1);
        assert_eq!(db.row_count("we\"ird").unwrap(), 0);
        let rows = db.sample_rows("order items", 10).unwrap();
        assert_eq!(rows[0].get("sku"), Some(&Value::Text("A-1".into())));
    }

    #[test]
    fn test_columns() {
        let db = seeded();
        let cols = db.columns("departments").unwrap();
        assert_eq!(
            cols,
            vec![
                ColumnInfo {
                    name: "id".into(),
                    declared_type: "INTEGER".into()
                },
                ColumnInfo {
                    name: "title".into(),
                    declared_type: "TEXT".into()
                },
            ]
        );
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        assert!(Database::open(&missing).is_err());
    }

    #[test]
    fn test_open_read_only_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('x');")
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.table_names().unwrap(), vec!["t"]);
        assert!(db.execute_batch("INSERT INTO t VALUES ('y')").is_err());
    }
}
