use super::*;
use crate::migration::script::SqlScript;
use crate::migration::state::STATE_TABLE;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use wf_db::{ColumnSpec, DataType, DbResult, Dialect, DuckDbBackend, QueryRows, Value};

fn sql(name: &str, up: &str, down: &str) -> Arc<dyn Script> {
    let text = format!("-- +up\n{up}\n-- +down\n{down}\n");
    Arc::new(SqlScript::parse(ScriptName::new(name), &text).unwrap())
}

fn standard_scripts() -> Vec<Arc<dyn Script>> {
    vec![
        sql(
            "01-create-users",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR);",
            "DROP TABLE users;",
        ),
        sql(
            "02-add-name-to-users",
            "ALTER TABLE users ADD COLUMN name VARCHAR;",
            "ALTER TABLE users DROP COLUMN name;",
        ),
        sql(
            "03-create-tasks",
            "CREATE TABLE tasks (id INTEGER PRIMARY KEY, title VARCHAR);",
            "DROP TABLE tasks;",
        ),
    ]
}

fn migrator(scripts: Vec<Arc<dyn Script>>) -> (Arc<dyn Database>, Migrator) {
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let migrator = Migrator::new(db.clone(), TypeRegistry::new(Dialect::DuckDb), scripts);
    (db, migrator)
}

/// Script built in code against the schema handle
struct CreateAudit(ScriptName);

#[async_trait]
impl Script for CreateAudit {
    fn name(&self) -> &ScriptName {
        &self.0
    }

    async fn up(&self, schema: &SchemaHandle<'_>, types: &TypeRegistry) -> MigrationResult<()> {
        if schema.table_exists("audit").await? {
            return Ok(());
        }
        let id = ColumnSpec::new("id", types.resolve("integer").map_err(MigrationError::Script)?)
            .primary_key()
            .auto_increment();
        let note = ColumnSpec::new("note", DataType::Text);
        schema.create_table("audit", &[id, note]).await
    }

    async fn down(&self, schema: &SchemaHandle<'_>, _types: &TypeRegistry) -> MigrationResult<()> {
        schema.drop_table("audit").await
    }
}

/// Embedded store that counts reads of the applied-state table
struct CountingDb {
    inner: DuckDbBackend,
    state_reads: AtomicUsize,
}

#[async_trait]
impl Database for CountingDb {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.inner.execute(sql).await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_batch(sql).await
    }

    async fn execute_params(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.inner.execute_params(sql, params).await
    }

    async fn query_rows(&self, sql: &str, params: &[Value]) -> DbResult<QueryRows> {
        if sql.contains(STATE_TABLE) {
            self.state_reads.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.query_rows(sql, params).await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.inner.query_count(sql).await
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.inner.relation_exists(name).await
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn drop_table(&self, name: &str) -> DbResult<()> {
        self.inner.drop_table(name).await
    }

    async fn drop_all(&self) -> DbResult<()> {
        self.inner.drop_all().await
    }

    async fn authenticate(&self) -> DbResult<()> {
        self.inner.authenticate().await
    }

    async fn close(&self) -> DbResult<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn db_type(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn test_fresh_store_status() {
    let (_db, migrator) = migrator(standard_scripts());
    let status = migrator.status().await.unwrap();
    assert!(status.executed.is_empty());
    assert_eq!(
        status.pending,
        vec!["01-create-users", "02-add-name-to-users", "03-create-tasks"]
    );
    assert!(status.current().is_none());
}

#[tokio::test]
async fn test_up_applies_all_in_order() {
    let (db, migrator) = migrator(standard_scripts());
    let applied = migrator.up().await.unwrap();
    assert_eq!(applied.len(), 3);

    let status = migrator.status().await.unwrap();
    assert!(status.is_up_to_date());
    assert_eq!(
        status.executed,
        vec!["03-create-tasks", "02-add-name-to-users", "01-create-users"]
    );
    assert!(db.relation_exists("tasks").await.unwrap());
    db.execute("INSERT INTO users (id, email, name) VALUES (1, 'a', 'b')")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_up_is_idempotent() {
    let (_db, migrator) = migrator(standard_scripts());
    migrator.up().await.unwrap();
    let second = migrator.up().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(migrator.status().await.unwrap().executed.len(), 3);
}

#[tokio::test]
async fn test_failure_stops_and_keeps_earlier_scripts() {
    let scripts = vec![
        sql(
            "01-ok",
            "CREATE TABLE first_t (id INTEGER);",
            "DROP TABLE first_t;",
        ),
        sql(
            "02-broken",
            "CREATE TABLE half_t (id INTEGER);\nSELECT * FROM missing_table;",
            "DROP TABLE half_t;",
        ),
        sql(
            "03-never",
            "CREATE TABLE never_t (id INTEGER);",
            "DROP TABLE never_t;",
        ),
    ];
    let (db, migrator) = migrator(scripts);

    let err = migrator.up().await.unwrap_err();
    match &err {
        MigrationError::ScriptFailed {
            name, direction, ..
        } => {
            assert_eq!(name, "02-broken");
            assert_eq!(*direction, Direction::Up);
        }
        other => panic!("expected ScriptFailed, got {other}"),
    }

    let status = migrator.status().await.unwrap();
    assert_eq!(status.executed, vec!["01-ok"]);
    assert_eq!(status.pending, vec!["02-broken", "03-never"]);
    assert!(db.relation_exists("first_t").await.unwrap());
    // The failing script's partial work was rolled back.
    assert!(!db.relation_exists("half_t").await.unwrap());
    assert!(!db.relation_exists("never_t").await.unwrap());
}

#[tokio::test]
async fn test_down_reverts_everything_in_reverse() {
    let (db, migrator) = migrator(standard_scripts());
    migrator.up().await.unwrap();

    let reverted = migrator.down().await.unwrap();
    assert_eq!(
        reverted,
        vec!["03-create-tasks", "02-add-name-to-users", "01-create-users"]
    );
    let status = migrator.status().await.unwrap();
    assert!(status.executed.is_empty());
    assert_eq!(status.pending.len(), 3);
    assert!(!db.relation_exists("users").await.unwrap());
}

#[tokio::test]
async fn test_prev_and_next_step_once() {
    let (db, migrator) = migrator(standard_scripts());

    assert_eq!(migrator.next().await.unwrap(), "01-create-users");
    assert_eq!(migrator.next().await.unwrap(), "02-add-name-to-users");
    assert_eq!(migrator.prev().await.unwrap(), "02-add-name-to-users");

    let status = migrator.status().await.unwrap();
    assert_eq!(status.executed, vec!["01-create-users"]);
    assert!(db.relation_exists("users").await.unwrap());
}

#[tokio::test]
async fn test_prev_on_initial_state_is_noop_error() {
    let (_db, migrator) = migrator(standard_scripts());
    let err = migrator.prev().await.unwrap_err();
    assert!(matches!(err, MigrationError::NoOp { .. }));
    assert!(err.to_string().contains("Already at the initial state"));
}

#[tokio::test]
async fn test_next_with_nothing_pending_is_noop_error() {
    let (_db, migrator) = migrator(standard_scripts());
    migrator.up().await.unwrap();
    let err = migrator.next().await.unwrap_err();
    assert!(err.to_string().contains("No pending migrations left"));
}

#[tokio::test]
async fn test_run_returns_error_and_summary_still_works() {
    let (_db, migrator) = migrator(standard_scripts());
    let result = migrator.run(MigrateCommand::Prev).await;
    assert!(matches!(result, Err(MigrationError::NoOp { .. })));

    let outcome = migrator.run(MigrateCommand::Up).await.unwrap();
    assert!(matches!(outcome, MigrationOutcome::Applied(ref names) if names.len() == 3));

    let summary = migrator.summary().await.unwrap();
    assert_eq!(summary.current.as_ref().unwrap(), "03-create-tasks");
    assert!(summary.pending.is_empty());
}

#[tokio::test]
async fn test_run_status_reports_without_applying() {
    let (_db, migrator) = migrator(standard_scripts());
    let outcome = migrator.run(MigrateCommand::Status).await.unwrap();
    match outcome {
        MigrationOutcome::Status(status) => assert_eq!(status.pending.len(), 3),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(migrator.status().await.unwrap().pending.len(), 3);
}

#[tokio::test]
async fn test_code_script_uses_schema_handle() {
    let scripts: Vec<Arc<dyn Script>> = vec![Arc::new(CreateAudit(ScriptName::new("01-audit")))];
    let (db, migrator) = migrator(scripts);

    migrator.up().await.unwrap();
    db.execute("INSERT INTO audit (note) VALUES ('one'), ('two')")
        .await
        .unwrap();
    assert_eq!(db.query_count("SELECT * FROM audit").await.unwrap(), 2);

    migrator.down().await.unwrap();
    assert!(!db.relation_exists("audit").await.unwrap());

    // Sequence went with the table, so re-applying starts clean.
    migrator.up().await.unwrap();
}

#[tokio::test]
async fn test_code_script_skips_existing_table() {
    let scripts: Vec<Arc<dyn Script>> = vec![Arc::new(CreateAudit(ScriptName::new("01-audit")))];
    let (db, migrator) = migrator(scripts);
    db.execute_batch("CREATE TABLE audit (id INTEGER, note VARCHAR); INSERT INTO audit VALUES (1, 'kept')")
        .await
        .unwrap();

    assert_eq!(migrator.up().await.unwrap(), vec!["01-audit"]);
    assert_eq!(db.query_count("SELECT * FROM audit").await.unwrap(), 1);
    assert!(migrator.status().await.unwrap().is_up_to_date());
}

#[tokio::test]
async fn test_status_reads_state_once() {
    let db = Arc::new(CountingDb {
        inner: DuckDbBackend::in_memory().unwrap(),
        state_reads: AtomicUsize::new(0),
    });
    let migrator = Migrator::new(
        db.clone(),
        TypeRegistry::new(Dialect::DuckDb),
        standard_scripts(),
    );
    migrator.next().await.unwrap();
    db.state_reads.store(0, Ordering::SeqCst);

    let status = migrator.status().await.unwrap();
    assert_eq!(status.executed, vec!["01-create-users"]);
    assert_eq!(status.pending.len(), 2);
    assert_eq!(db.state_reads.load(Ordering::SeqCst), 1);

    migrator.summary().await.unwrap();
    assert_eq!(db.state_reads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_join_or() {
    assert_eq!(join_or(&[], "none"), "none");
    assert_eq!(
        join_or(&[ScriptName::new("a"), ScriptName::new("b")], "none"),
        "a, b"
    );
}
