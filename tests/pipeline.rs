//! End-to-end behavior of the retrieval pipeline against SQLite fixtures.
//!
//! Uses the hashing embedder so no model download is needed.
//!
//! Run with: `cargo test --test pipeline`

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use tablerag::config::RagConfig;
use tablerag::db::{DataSource, Database};
use tablerag::rag::embeddings::{Embedder, HashEmbedder};
use tablerag::rag::retriever::NO_CONTEXT;
use tablerag::service::RagService;
use tablerag::types::{Row, StructuredSummary};

/// `employees` with 12 rows and `departments` with 4.
fn company_sql() -> String {
    let mut sql = String::from(
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, role TEXT, salary REAL);
         CREATE TABLE departments (id INTEGER PRIMARY KEY, title TEXT);",
    );
    let roles = ["engineer", "designer", "analyst"];
    for i in 1..=12 {
        let role = roles[i % roles.len()];
        sql.push_str(&format!(
            "INSERT INTO employees VALUES ({i}, 'employee_{i}', '{role}', {}.5);",
            40_000 + i * 1_000
        ));
    }
    for (i, title) in ["Research", "Sales", "Support", "Finance"].iter().enumerate() {
        sql.push_str(&format!("INSERT INTO departments VALUES ({}, '{title}');", i + 1));
    }
    sql
}

fn memory_db(sql: &str) -> Database {
    let db = Database::open_memory().expect("in-memory DB");
    db.execute_batch(sql).expect("fixture");
    db
}

fn service_with(source: Arc<dyn DataSource>, config: RagConfig) -> RagService {
    RagService::new(source, Arc::new(HashEmbedder::default()), config).expect("service")
}

// ── Structured summaries ──

#[test]
fn first_token_table_name_selects_that_table() {
    let svc = service_with(Arc::new(memory_db(&company_sql())), RagConfig::default());

    let summary = svc
        .get_structured_summary("employees earning the most?")
        .unwrap();
    let StructuredSummary::Table {
        table,
        row_count,
        sample_data,
    } = summary
    else {
        panic!("expected table summary");
    };
    assert_eq!(table, "employees");
    assert_eq!(row_count, 12);
    assert_eq!(sample_data.len(), 5);
    assert_eq!(sample_data[0].columns().len(), 4);
}

#[test]
fn unmatched_question_lists_every_table() {
    let svc = service_with(Arc::new(memory_db(&company_sql())), RagConfig::default());

    let summary = svc
        .get_structured_summary("How many people work here?")
        .unwrap();
    assert_eq!(summary.matched_table(), None);

    // Known tables come from sqlite_master ordered by name.
    assert_eq!(
        serde_json::to_string(&summary).unwrap(),
        r#"{"summary":{"departments":{"row_count":4},"employees":{"row_count":12}}}"#
    );
}

#[test]
fn sample_limit_caps_rows_for_small_and_large_tables() {
    let config = RagConfig {
        sample_row_limit: 3,
        ..Default::default()
    };
    let svc = service_with(Arc::new(memory_db(&company_sql())), config);

    let StructuredSummary::Table { sample_data, .. } =
        svc.get_structured_summary("departments").unwrap()
    else {
        panic!("expected table summary");
    };
    assert_eq!(sample_data.len(), 3);
}

// ── Refresh and retrieval ──

#[test]
fn context_is_cut_to_character_limit() {
    let mut sql = String::from("CREATE TABLE notes (body TEXT);");
    for i in 0..200 {
        sql.push_str(&format!(
            "INSERT INTO notes VALUES ('note number {i} about quarterly planning');"
        ));
    }
    let svc = service_with(Arc::new(memory_db(&sql)), RagConfig::default());
    svc.refresh().unwrap();

    let context = svc.retrieve_context("quarterly planning");
    assert_eq!(context.chars().count(), 300);
    assert!(context.starts_with("Table: notes, body: note number"));
}

#[test]
fn every_chunk_retrieves_itself_first() {
    let config = RagConfig {
        chunk_max_len: 80,
        top_k: 1,
        ..Default::default()
    };
    let svc = service_with(Arc::new(memory_db(&company_sql())), config);
    let report = svc.refresh().unwrap();
    assert!(report.chunks > 1, "fixture should split into several chunks");

    let index = svc.active_index().expect("index published");
    for text in index.texts() {
        let hits = svc.search(text).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, text);
        assert_eq!(hits[0].score, 0.0);
    }
}

#[test]
fn empty_corpus_refresh_fails_and_keeps_previous_index() {
    let db = Arc::new(memory_db(
        "CREATE TABLE pets (name TEXT); INSERT INTO pets VALUES ('Rex');",
    ));
    let svc = service_with(db.clone(), RagConfig::default());

    svc.refresh().unwrap();
    let before = svc.active_index().expect("first index");
    let context_before = svc.retrieve_context("Rex");

    db.execute_batch("DELETE FROM pets;").unwrap();
    let err = svc.refresh().unwrap_err();
    assert_eq!(err.kind(), "empty_corpus");

    let after = svc.active_index().expect("index still served");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(svc.stats().generation, 1);
    assert_eq!(svc.retrieve_context("Rex"), context_before);
}

#[test]
fn no_tables_means_no_context() {
    let svc = service_with(Arc::new(Database::open_memory().unwrap()), RagConfig::default());

    assert_eq!(svc.refresh().unwrap_err().kind(), "empty_corpus");
    assert_eq!(svc.retrieve_context("anything"), NO_CONTEXT);
    assert_eq!(
        svc.get_structured_summary("anything").unwrap(),
        StructuredSummary::AllTables { summary: vec![] }
    );
}

/// One-shot rendezvous: once armed, the next `pass` parks until released.
struct Gate(Mutex<Option<(Sender<()>, Receiver<()>)>>);

impl Gate {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Returns (entered, release): `entered` fires when a caller is parked,
    /// sending on `release` lets it continue.
    fn arm(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.0.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    fn pass(&self) {
        let armed = self.0.lock().unwrap().take();
        if let Some((entered, release)) = armed {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
    }
}

/// Data source whose `sample_rows` parks at the gate.
struct GatedSource {
    inner: Database,
    gate: Gate,
}

impl DataSource for GatedSource {
    fn table_names(&self) -> Result<Vec<String>> {
        self.inner.table_names()
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        self.inner.row_count(table)
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        self.gate.pass();
        self.inner.sample_rows(table, limit)
    }
}

/// Embedder that, like the ONNX engine, runs one call at a time behind a lock.
/// With `park_in_batch` it parks inside `embed_batch` while holding that lock;
/// otherwise it parks inside `embed`.
struct GatedEmbedder {
    inner: HashEmbedder,
    model: Mutex<()>,
    gate: Gate,
    park_in_batch: bool,
}

impl GatedEmbedder {
    fn new(park_in_batch: bool) -> Self {
        Self {
            inner: HashEmbedder::default(),
            model: Mutex::new(()),
            gate: Gate::new(),
            park_in_batch,
        }
    }
}

impl Embedder for GatedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let _model = self.model.lock().unwrap();
        if !self.park_in_batch {
            self.gate.pass();
        }
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let _model = self.model.lock().unwrap();
        if self.park_in_batch {
            self.gate.pass();
        }
        texts.iter().map(|text| self.inner.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

const PETS_SQL: &str = "CREATE TABLE pets (name TEXT, species TEXT);
     INSERT INTO pets VALUES ('Rex', 'dog');";
const REX: &str = "Table: pets, name: Rex, species: dog";

#[test]
fn readers_see_old_index_until_rebuild_publishes() {
    let source = Arc::new(GatedSource {
        inner: memory_db(PETS_SQL),
        gate: Gate::new(),
    });
    let svc = service_with(source.clone(), RagConfig::default());
    svc.refresh().unwrap();
    let old_context = svc.retrieve_context("dog");
    assert_eq!(old_context, REX);

    source
        .inner
        .execute_batch("INSERT INTO pets VALUES ('Tom', 'cat');")
        .unwrap();
    let (entered, release) = source.gate.arm();

    thread::scope(|s| {
        let rebuild = s.spawn(|| svc.refresh());
        entered.recv().unwrap();

        // Build is parked: queries run and still see generation 1.
        assert!(svc.stats().rebuilding);
        assert_eq!(svc.stats().generation, 1);
        assert_eq!(svc.retrieve_context("dog"), old_context);
        assert_eq!(svc.get_structured_summary("pets").unwrap().matched_table(), Some("pets"));

        release.send(()).unwrap();
        let report = rebuild.join().unwrap().unwrap();
        assert_eq!(report.generation, 2);
        assert_eq!(report.rows_sampled, 2);
    });

    assert!(!svc.stats().rebuilding);
    let new_context = svc.retrieve_context("cat");
    assert!(new_context.contains("name: Tom, species: cat"));
}

#[test]
fn queries_do_not_wait_for_build_side_embedding() {
    let build = Arc::new(GatedEmbedder::new(true));
    let svc = RagService::new(
        Arc::new(memory_db(PETS_SQL)),
        build.clone(),
        RagConfig::default(),
    )
    .unwrap()
    .with_query_embedder(Arc::new(HashEmbedder::default()))
    .unwrap();
    svc.refresh().unwrap();

    let (entered, release) = build.gate.arm();
    thread::scope(|s| {
        let rebuild = s.spawn(|| svc.refresh());
        entered.recv().unwrap();

        // The build holds the embedder lock; a query must still answer.
        let (done_tx, done_rx) = mpsc::channel();
        s.spawn({
            let svc = &svc;
            move || done_tx.send(svc.retrieve_context("dog")).unwrap()
        });
        let answered = done_rx.recv_timeout(Duration::from_secs(10));

        release.send(()).unwrap();
        rebuild.join().unwrap().unwrap();
        assert_eq!(answered.as_deref(), Ok(REX));
    });
}

#[test]
fn context_and_chunks_come_from_one_snapshot() {
    let db = Arc::new(memory_db(PETS_SQL));
    let query = Arc::new(GatedEmbedder::new(false));
    let svc = RagService::new(db.clone(), Arc::new(HashEmbedder::default()), RagConfig::default())
        .unwrap()
        .with_query_embedder(query.clone())
        .unwrap();
    svc.refresh().unwrap();
    db.execute_batch("INSERT INTO pets VALUES ('Tom', 'cat');")
        .unwrap();

    let (entered, release) = query.gate.arm();
    thread::scope(|s| {
        let reader = s.spawn(|| svc.retrieve("dog"));
        entered.recv().unwrap();

        // The reader already holds generation 1; publish generation 2 under it.
        assert_eq!(svc.refresh().unwrap().generation, 2);
        release.send(()).unwrap();

        let retrieved = reader.join().unwrap();
        assert_eq!(retrieved.chunks.len(), 1);
        assert_eq!(retrieved.chunks[0].text, REX);
        assert_eq!(retrieved.context, REX);
    });

    assert!(svc.retrieve("cat").context.contains("Tom"));
}

// ── File-backed database ──

#[test]
fn file_database_is_opened_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("company.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(&company_sql()).unwrap();
    }

    let db = Database::open(&path).unwrap();
    let svc = service_with(Arc::new(db), RagConfig::default());
    assert_eq!(svc.known_tables(), ["departments", "employees"]);

    let report = svc.refresh().unwrap();
    assert_eq!(report.tables, 2);
    assert_eq!(report.rows_sampled, 16);

    let messages = svc.prompt("departments overview");
    assert_eq!(messages.len(), 4);
    assert!(messages[1].content.contains(r#""table":"departments""#));
    assert!(messages[2].content.starts_with("Context: Table: "));
}

#[test]
fn missing_database_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Database::open(dir.path().join("absent.db")).is_err());
}
