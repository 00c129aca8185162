//! Integration tests for the Wharf lifecycle manager
//!
//! Each test copies `tests/fixtures/sample_project` into a scratch directory
//! so the DuckDB store file lives outside the source tree.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wf_core::entity::Record;
use wf_core::{
    translate, CommandOutcome, Config, Database, EntityError, Events, Hook, Lifecycle, LifecycleBuilder,
    LifecycleCommand, LifecycleError, MigrateCommand, MigrationError, MigrationOutcome,
    SeedOutcome,
};

const FIXTURE: &str = "tests/fixtures/sample_project";

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(Path::new(FIXTURE), tmp.path());
    tmp
}

fn lifecycle(root: &Path, env: &str) -> Lifecycle {
    let config = Config::load_from_dir(root).unwrap();
    LifecycleBuilder::from_config(root, &config, env)
        .unwrap()
        .build()
        .unwrap()
        .expect("store is enabled")
}

fn names(list: &[wf_core::ScriptName]) -> Vec<&str> {
    list.iter().map(|n| n.as_str()).collect()
}

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn test_fresh_store_is_all_pending() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    let status = lc.migrator().status().await.unwrap();
    assert!(status.executed.is_empty());
    assert_eq!(
        names(&status.pending),
        vec!["01-create-users", "02-create-audit-log", "03-create-tasks"]
    );
    assert!(root.path().join("db/duckdb/wharf_test.duckdb").exists());
}

#[tokio::test]
async fn test_connect_refuses_pending_scripts() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    match lc.connect().await {
        Err(LifecycleError::PendingMigrations { pending }) => assert_eq!(pending.len(), 3),
        other => panic!("expected pending migrations, got {:?}", other.err()),
    }

    lc.migrator().up().await.unwrap();
    lc.connect().await.unwrap();
}

#[tokio::test]
async fn test_up_then_down_round_trip() {
    let root = project();
    let lc = lifecycle(root.path(), "test");
    let db = lc.connection().clone();

    lc.migrator().status().await.unwrap();
    let before = db.list_tables().await.unwrap();

    let applied = lc.migrator().up().await.unwrap();
    assert_eq!(applied.len(), 3);
    assert!(db.relation_exists("Tasks").await.unwrap());

    let reverted = lc.migrator().down().await.unwrap();
    assert_eq!(
        names(&reverted),
        vec!["03-create-tasks", "02-create-audit-log", "01-create-users"]
    );
    assert_eq!(db.list_tables().await.unwrap(), before);
}

#[tokio::test]
async fn test_next_steps_match_prefix_of_up() {
    let root = project();
    let lc = lifecycle(root.path(), "test");
    let migrator = lc.migrator();

    assert_eq!(migrator.next().await.unwrap().as_str(), "01-create-users");
    assert_eq!(migrator.next().await.unwrap().as_str(), "02-create-audit-log");

    let status = migrator.status().await.unwrap();
    assert_eq!(
        names(&status.executed),
        vec!["02-create-audit-log", "01-create-users"]
    );
    assert_eq!(names(&status.pending), vec!["03-create-tasks"]);
}

#[tokio::test]
async fn test_prev_on_empty_store_is_noop_error() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    let err = lc.migrator().prev().await.unwrap_err();
    assert!(matches!(err, MigrationError::NoOp { .. }));
    let status = lc.migrator().status().await.unwrap();
    assert!(status.executed.is_empty());
    assert_eq!(status.pending.len(), 3);
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    lc.migrator().up().await.unwrap();
    lc.models()
        .get("User")
        .unwrap()
        .create(&record(json!({ "name": "Ada", "email": "ada@example.com" })))
        .await
        .unwrap();

    let first = lc.reset().await.unwrap();
    assert_eq!(first.len(), 3);
    let second = lc.reset().await.unwrap();
    assert_eq!(first, second);

    assert_eq!(lc.models().get("User").unwrap().count().await.unwrap(), 0);
    let status = lc.migrator().status().await.unwrap();
    assert!(status.is_up_to_date());
    assert_eq!(status.executed.len(), 3);
}

#[tokio::test]
async fn test_seed_twice_yields_same_rows() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    for _ in 0..2 {
        assert_eq!(
            lc.seed().await.unwrap(),
            SeedOutcome::Seeded { records: 3 }
        );
        assert_eq!(lc.models().get("User").unwrap().count().await.unwrap(), 1);
        assert_eq!(lc.models().get("Task").unwrap().count().await.unwrap(), 2);
    }

    let users = lc.models().get("User").unwrap();
    let ada = users.find_all().await.unwrap().remove(0);
    let tasks = users.children(ada["id"].as_i64().unwrap(), "Task").await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1]["done"], json!(true));
}

#[tokio::test]
async fn test_seed_skipped_outside_listed_environments() {
    let root = project();
    let lc = lifecycle(root.path(), "staging");
    assert_eq!(lc.seed().await.unwrap(), SeedOutcome::Skipped);
    // Skipping happens before the reset.
    assert!(!lc.migrator().status().await.unwrap().is_up_to_date());
}

#[tokio::test]
async fn test_seed_missing_file_keeps_existing_rows() {
    let root = project();
    std::fs::remove_file(root.path().join("db/seed.yml")).unwrap();
    let lc = lifecycle(root.path(), "test");
    lc.migrator().up().await.unwrap();
    let users = lc.models().get("User").unwrap();
    users
        .create(&record(json!({ "name": "Ada", "email": "ada@example.com" })))
        .await
        .unwrap();

    assert_eq!(lc.seed().await.unwrap(), SeedOutcome::Missing);
    assert_eq!(users.count().await.unwrap(), 1);
    assert!(lc.migrator().status().await.unwrap().is_up_to_date());
}

#[tokio::test]
async fn test_failing_seed_is_reported_not_raised() {
    let root = project();
    std::fs::write(
        root.path().join("db/seed.yml"),
        "records:\n  User:\n    - name: Nobody\n",
    )
    .unwrap();
    let lc = lifecycle(root.path(), "test");

    match lc.seed().await.unwrap() {
        SeedOutcome::Failed { message } => assert!(message.contains("email")),
        other => panic!("expected a failed seed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_truncate_keeps_schema() {
    let root = project();
    let lc = lifecycle(root.path(), "test");
    lc.seed().await.unwrap();

    assert_eq!(
        lc.run(LifecycleCommand::Truncate).await.unwrap(),
        CommandOutcome::Truncated
    );
    assert_eq!(lc.models().get("Task").unwrap().count().await.unwrap(), 0);
    assert_eq!(lc.models().get("User").unwrap().count().await.unwrap(), 0);
    assert!(lc.migrator().status().await.unwrap().is_up_to_date());
}

#[tokio::test]
async fn test_duplicate_email_translates_to_single_entry() {
    let root = project();
    let lc = lifecycle(root.path(), "test");
    lc.migrator().up().await.unwrap();

    let users = lc.context().model("User").unwrap();
    let ada = record(json!({ "name": "Ada", "email": "ada@example.com" }));
    users.create(&ada).await.unwrap();

    let err = users.create(&ada).await.unwrap_err();
    assert!(matches!(err, EntityError::UniqueConstraint { .. }));
    let report = translate(err).unwrap();
    assert_eq!(
        report.to_json()["attributes"],
        json!({ "email": { "message": "email is already in use", "code": "unique" } })
    );
}

#[tokio::test]
async fn test_associations_wired_both_ways() {
    let root = project();
    let lc = lifecycle(root.path(), "test");
    let models = lc.models();

    assert_eq!(models.len(), 2);
    assert!(models.mapping("User").unwrap().association_to("Task").is_some());
    assert!(models.mapping("Task").unwrap().association_to("User").is_some());
}

#[tokio::test]
async fn test_run_dispatches_migrations() {
    let root = project();
    let lc = lifecycle(root.path(), "test");

    match lc.run(LifecycleCommand::Migrate(MigrateCommand::Next)).await.unwrap() {
        CommandOutcome::Migration(MigrationOutcome::Applied(applied)) => {
            assert_eq!(names(&applied), vec!["01-create-users"])
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    match lc.run(LifecycleCommand::Migrate(MigrateCommand::Status)).await.unwrap() {
        CommandOutcome::Migration(MigrationOutcome::Status(status)) => {
            assert_eq!(status.pending.len(), 2)
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_hooks_connect_and_disconnect() {
    let root = project();
    let lc = Arc::new(lifecycle(root.path(), "test"));
    lc.migrator().up().await.unwrap();

    let mut events = Events::new();
    lc.register_hooks(&mut events);
    assert_eq!(events.handler_count(Hook::BeforeStart), 1);

    events.emit(Hook::BeforeStart).await.unwrap();
    events.emit(Hook::BeforeStop).await.unwrap();
    assert!(lc.connection().is_closed());
    // A second stop is harmless.
    lc.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_applied_state_survives_reopen() {
    let root = project();
    {
        let lc = lifecycle(root.path(), "test");
        lc.migrator().up().await.unwrap();
        lc.disconnect().await.unwrap();
    }
    let lc = lifecycle(root.path(), "test");
    lc.connect().await.unwrap();
}

#[test]
fn test_disabled_store_builds_nothing() {
    let root = project();
    let config = Config::load_from_dir(root.path()).unwrap();
    let built = LifecycleBuilder::from_config(root.path(), &config, "offline")
        .unwrap()
        .build()
        .unwrap();
    assert!(built.is_none());
}

#[tokio::test]
async fn test_unreachable_postgres_is_a_connection_error() {
    let root = project();
    std::fs::write(
        root.path().join("wharf.yml"),
        "database:\n  enabled: true\n  dialect: postgres\n  connection: wharf@127.0.0.1:1/app\n  ssl: false\n",
    )
    .unwrap();
    let config = Config::load_from_dir(root.path()).unwrap();
    let lc = LifecycleBuilder::from_config(root.path(), &config, "production")
        .unwrap()
        .build()
        .unwrap()
        .expect("store is enabled");
    assert_eq!(lc.context().dialect().to_string(), "postgres");
    assert!(!root.path().join("db/postgres").exists());

    let err = lc.connect().await.unwrap_err();
    assert!(matches!(err, LifecycleError::Connection(_)), "{err}");
    lc.disconnect().await.unwrap();
}
