use pretty_assertions::assert_eq;
use sqlpad_storage::{ImportError, InMemoryKeyValueStore, Value, EXPORT_FILE_NAME};
use std::path::Path;
use std::sync::Arc;
use workbench::{
    ImportFailurePolicy, Pane, RunStatus, Session, SessionError, SessionState, WorkbenchConfig,
};

async fn session_with(policy: ImportFailurePolicy) -> Session {
    let config = WorkbenchConfig {
        import_failure: policy,
        ..WorkbenchConfig::default()
    };
    Session::start(config, Arc::new(InMemoryKeyValueStore::new())).await
}

async fn table_names(session: &Session) -> Vec<Value> {
    session
        .run_sql("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name;")
        .await
        .expect("list tables");
    session.result().expect("result").rows.into_iter().flatten().collect()
}

#[tokio::test]
async fn export_then_import_restores_the_schema() {
    let session = session_with(ImportFailurePolicy::KeepPrevious).await;
    session
        .run_sql("CREATE TABLE users (id INTEGER); CREATE TABLE orders (id INTEGER);")
        .await
        .expect("schema");
    let before = table_names(&session).await;

    let artifact = session.export().await.expect("export").expect("artifact");
    assert_eq!(artifact.file_name, EXPORT_FILE_NAME);

    let other = session_with(ImportFailurePolicy::KeepPrevious).await;
    other.import_bytes(artifact.bytes).await.expect("import");
    assert_eq!(table_names(&other).await, before);
}

#[tokio::test]
async fn successful_import_shows_table_list_and_clears_errors() {
    let source = session_with(ImportFailurePolicy::KeepPrevious).await;
    source.run_sql("CREATE TABLE products (sku TEXT);").await.expect("schema");
    let bytes = source.export().await.expect("export").expect("artifact").bytes;

    let session = session_with(ImportFailurePolicy::KeepPrevious).await;
    session.run_sql("SELECT * FROM nope;").await.expect("run");
    assert!(session.error().is_some());

    session.import_bytes(bytes).await.expect("import");
    assert_eq!(session.error(), None);
    assert_eq!(session.active_pane(), Pane::Results);
    let result = session.result().expect("diagnostic result");
    assert_eq!(result.columns, vec!["name".to_string()]);
    assert_eq!(result.rows, vec![vec![Value::Text("products".into())]]);
}

#[tokio::test]
async fn failed_import_keeps_previous_database_by_default() {
    let session = session_with(ImportFailurePolicy::KeepPrevious).await;
    session.run_sql("CREATE TABLE kept (x);").await.expect("schema");

    let err = session
        .import_bytes(vec![0x13; 2048])
        .await
        .expect_err("garbage import");
    assert!(matches!(err, SessionError::Import(ImportError::Engine(_))));
    assert_eq!(
        session.error().as_deref(),
        Some("Failed to import database: file is not a database")
    );
    assert_eq!(session.active_pane(), Pane::Errors);

    assert!(session.has_database());
    assert_eq!(table_names(&session).await, vec![Value::Text("kept".into())]);
}

#[tokio::test]
async fn failed_import_can_discard_previous_database() {
    let session = session_with(ImportFailurePolicy::DiscardPrevious).await;
    session.run_sql("CREATE TABLE gone (x);").await.expect("schema");

    session
        .import_bytes(b"definitely not sqlite".repeat(64))
        .await
        .expect_err("garbage import");
    assert!(!session.has_database());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.run_sql("SELECT 1;").await.expect("run"), RunStatus::NoDatabase);

    // A valid image brings the session back.
    let donor = session_with(ImportFailurePolicy::KeepPrevious).await;
    donor.run_sql("CREATE TABLE back (x);").await.expect("schema");
    let bytes = donor.export().await.expect("export").expect("artifact").bytes;
    session.import_bytes(bytes).await.expect("import");
    assert_eq!(table_names(&session).await, vec![Value::Text("back".into())]);
}

#[tokio::test]
async fn import_file_rejects_unknown_extensions() {
    let session = session_with(ImportFailurePolicy::KeepPrevious).await;
    let err = session
        .import_file(Path::new("notes.txt"))
        .await
        .expect_err("extension refused");
    assert!(matches!(
        err,
        SessionError::Import(ImportError::UnsupportedExtension(_))
    ));
    assert!(session.has_database());
}

#[tokio::test]
async fn export_to_directory_uses_default_file_name() {
    let dir = tempfile::tempdir().expect("temp dir");
    let session = session_with(ImportFailurePolicy::KeepPrevious).await;
    session.run_sql("CREATE TABLE t (x);").await.expect("schema");

    let written = session
        .export_to(dir.path())
        .await
        .expect("export")
        .expect("written path");
    assert_eq!(written, dir.path().join("database.sqlite"));

    let reopened = session_with(ImportFailurePolicy::KeepPrevious).await;
    reopened.import_file(&written).await.expect("import file");
    assert_eq!(table_names(&reopened).await, vec![Value::Text("t".into())]);
}
