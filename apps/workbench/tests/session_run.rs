use pretty_assertions::assert_eq;
use sqlpad_storage::{InMemoryKeyValueStore, QueryResult, ResultKind, Value};
use std::sync::Arc;
use workbench::{Pane, RunStatus, Session, SessionState, WorkbenchConfig};

async fn ready_session() -> Session {
    let session = Session::start(
        WorkbenchConfig::default(),
        Arc::new(InMemoryKeyValueStore::new()),
    )
    .await;
    assert_eq!(session.state(), SessionState::Ready);
    session
}

#[tokio::test]
async fn startup_runs_the_seed_query() {
    let session = ready_session().await;

    assert!(session.has_database());
    assert_eq!(session.query(), "SELECT sqlite_version();");
    let result = session.result().expect("seed result");
    assert_eq!(result.columns, vec!["sqlite_version()".to_string()]);
    assert_eq!(result.rows.len(), 1);
    assert!(session.execution_time().is_some());
    assert_eq!(session.error(), None);
}

#[tokio::test]
async fn zero_row_select_and_ddl_are_distinguishable() {
    let session = ready_session().await;

    session.set_query("CREATE TABLE t (a INTEGER, b TEXT);");
    assert_eq!(session.run().await.expect("run"), RunStatus::Succeeded);
    assert_eq!(session.result(), Some(QueryResult::empty()));

    session.set_query("SELECT a, b FROM t;");
    assert_eq!(session.run().await.expect("run"), RunStatus::Succeeded);
    let result = session.result().expect("result");
    assert_eq!(result.kind(), ResultKind::NoRows);
    assert_eq!(result.columns, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn multi_statement_script_shows_first_group() {
    let session = ready_session().await;
    let status = session.run_sql("SELECT 1; SELECT 2;").await.expect("run");
    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(
        session.result().expect("result").rows,
        vec![vec![Value::Integer(1)]]
    );
}

#[tokio::test]
async fn error_clears_result_and_timing() {
    let session = ready_session().await;
    assert!(session.result().is_some());

    let status = session.run_sql("SELECT * FROM missing_table;").await.expect("run");
    assert_eq!(status, RunStatus::Failed);
    assert_eq!(session.error().as_deref(), Some("no such table: missing_table"));
    assert_eq!(session.result(), None);
    assert_eq!(session.execution_time(), None);
    assert_eq!(session.active_pane(), Pane::Errors);
    assert_eq!(session.state(), SessionState::Ready);

    // The next successful run replaces the error and brings results forward.
    assert_eq!(session.run_sql("SELECT 1;").await.expect("run"), RunStatus::Succeeded);
    assert_eq!(session.error(), None);
    assert_eq!(session.active_pane(), Pane::Results);
    assert!(session.execution_time().is_some());
}

#[tokio::test]
async fn run_sql_leaves_the_editor_alone() {
    let session = ready_session().await;
    session.set_query("SELECT 42;");
    session.run_sql("SELECT 1;").await.expect("run");
    assert_eq!(session.query(), "SELECT 42;");
}

#[tokio::test]
async fn closed_session_ignores_runs() {
    let session = ready_session().await;
    session.close().expect("close");

    assert!(!session.has_database());
    assert_eq!(session.run().await.expect("run"), RunStatus::NoDatabase);
    assert_eq!(session.export().await.expect("export"), None);
}
