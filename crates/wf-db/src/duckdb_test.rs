use super::*;
use crate::types::{ColumnSpec, DataType, TypeRegistry};

async fn users_table(db: &DuckDbBackend) -> DbResult<()> {
    let types = TypeRegistry::new(Dialect::DuckDb);
    let stmts = types.create_table_sql(
        "Users",
        &[
            ColumnSpec::new("id", DataType::Integer)
                .primary_key()
                .auto_increment(),
            ColumnSpec::new("email", DataType::String).not_null().unique(),
        ],
    );
    for stmt in stmts {
        db.execute_batch(&stmt).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.db_type(), "duckdb");
    assert_eq!(db.dialect(), Dialect::DuckDb);
}

#[tokio::test]
async fn test_query_count() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE nums AS SELECT * FROM range(10) t(n)")
        .await
        .unwrap();

    let count = db.query_count("SELECT * FROM nums").await.unwrap();
    assert_eq!(count, 10);
}

#[tokio::test]
async fn test_execute_batch() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE t1 (id INT); CREATE TABLE t2 (id INT); INSERT INTO t1 VALUES (1);",
    )
    .await
    .unwrap();

    assert!(db.relation_exists("t1").await.unwrap());
    assert!(db.relation_exists("t2").await.unwrap());
    assert_eq!(db.list_tables().await.unwrap(), vec!["t1", "t2"]);
}

#[tokio::test]
async fn test_relation_not_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.relation_exists("nonexistent").await.unwrap());
}

#[tokio::test]
async fn test_query_rows_typed_values() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE items (id INTEGER, label VARCHAR, price DOUBLE, active BOOLEAN);
         INSERT INTO items VALUES (1, 'one', 1.5, true), (2, NULL, 2.0, false);",
    )
    .await
    .unwrap();

    let rows = db
        .query_rows("SELECT * FROM items WHERE id >= $1 ORDER BY id", &[Value::Int(1)])
        .await
        .unwrap();

    assert_eq!(rows.columns, vec!["id", "label", "price", "active"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.get(0, "id"), Some(&Value::Int(1)));
    assert_eq!(rows.get(0, "label"), Some(&Value::Text("one".into())));
    assert_eq!(rows.get(0, "price"), Some(&Value::Float(1.5)));
    assert_eq!(rows.get(0, "active"), Some(&Value::Bool(true)));
    assert_eq!(rows.get(1, "label"), Some(&Value::Null));
}

#[tokio::test]
async fn test_query_rows_empty_result_keeps_columns() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE empty_t (a INTEGER, b VARCHAR)")
        .await
        .unwrap();
    let rows = db.query_rows("SELECT a, b FROM empty_t", &[]).await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(rows.columns, vec!["a", "b"]);
}

#[tokio::test]
async fn test_auto_increment_and_returning() {
    let db = DuckDbBackend::in_memory().unwrap();
    users_table(&db).await.unwrap();

    let first = db
        .query_rows(
            "INSERT INTO \"Users\" (\"email\") VALUES ($1) RETURNING \"id\"",
            &[Value::from("a@example.com")],
        )
        .await
        .unwrap();
    let second = db
        .query_rows(
            "INSERT INTO \"Users\" (\"email\") VALUES ($1) RETURNING \"id\"",
            &[Value::from("b@example.com")],
        )
        .await
        .unwrap();

    assert_eq!(first.get(0, "id"), Some(&Value::Int(1)));
    assert_eq!(second.get(0, "id"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_unique_violation_is_classified() {
    let db = DuckDbBackend::in_memory().unwrap();
    users_table(&db).await.unwrap();
    let insert = "INSERT INTO \"Users\" (\"email\") VALUES ($1)";
    db.execute_params(insert, &[Value::from("dup@example.com")])
        .await
        .unwrap();

    let err = db
        .execute_params(insert, &[Value::from("dup@example.com")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, DbError::UniqueViolation { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_not_null_violation_is_classified() {
    let db = DuckDbBackend::in_memory().unwrap();
    users_table(&db).await.unwrap();
    let err = db
        .execute_params("INSERT INTO \"Users\" (\"email\") VALUES ($1)", &[Value::Null])
        .await
        .unwrap_err();
    match err {
        DbError::NotNullViolation { field, .. } => assert_eq!(field, "email"),
        other => panic!("expected NotNullViolation, got {other}"),
    }
}

#[tokio::test]
async fn test_drop_table_removes_sequence() {
    let db = DuckDbBackend::in_memory().unwrap();
    users_table(&db).await.unwrap();

    db.drop_table("Users").await.unwrap();

    assert!(!db.relation_exists("Users").await.unwrap());
    let seqs = db
        .query_count("SELECT * FROM duckdb_sequences() WHERE schema_name = 'main'")
        .await
        .unwrap();
    assert_eq!(seqs, 0);

    // Recreating works because the sequence is gone too.
    users_table(&db).await.unwrap();
}

#[tokio::test]
async fn test_drop_all_respects_foreign_keys() {
    let db = DuckDbBackend::in_memory().unwrap();
    users_table(&db).await.unwrap();
    db.execute_batch(
        "CREATE TABLE \"Tasks\" (\"id\" INTEGER PRIMARY KEY, \"userId\" INTEGER REFERENCES \"Users\"(\"id\"));
         CREATE VIEW task_view AS SELECT * FROM \"Tasks\";",
    )
    .await
    .unwrap();

    db.drop_all().await.unwrap();

    assert!(db.list_tables().await.unwrap().is_empty());
    assert!(!db.relation_exists("task_view").await.unwrap());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.is_closed());
    db.authenticate().await.unwrap();

    db.close().await.unwrap();
    db.close().await.unwrap();

    assert!(db.is_closed());
    assert!(matches!(
        db.authenticate().await,
        Err(DbError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_file_backed_store_persists() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("store.duckdb");

    {
        let db = DuckDbBackend::from_path(&path).unwrap();
        db.execute_batch("CREATE TABLE kept (id INTEGER)").await.unwrap();
        db.close().await.unwrap();
    }

    let db = DuckDbBackend::new(path.to_str().unwrap()).unwrap();
    assert!(db.relation_exists("kept").await.unwrap());
}

#[test]
fn test_open_picks_backend_by_dialect() {
    let duck = crate::open(Dialect::DuckDb, ":memory:", false).unwrap();
    assert_eq!(duck.db_type(), "duckdb");
    let pg = crate::open(Dialect::Postgres, "postgres://localhost/app", false).unwrap();
    assert_eq!(pg.db_type(), "postgres");
}
