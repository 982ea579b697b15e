use pretty_assertions::assert_eq;
use sqlpad_storage::{
    execute, export_snapshot, import_snapshot, read_snapshot_file, EngineHandle, EngineOptions,
    EngineRuntime, Value, EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME, LIST_TABLES_QUERY,
};

fn table_names(db: &EngineHandle) -> Vec<Value> {
    let out = execute(db, "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name;")
        .expect("list tables");
    out.result.rows.into_iter().flatten().collect()
}

#[test]
fn export_then_import_preserves_tables_and_rows() {
    let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
    let original = runtime.new_instance(None).expect("new instance");
    execute(
        &original,
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER);
         INSERT INTO users (name) VALUES ('Ada'), ('Linus');",
    )
    .expect("seed");

    let artifact = export_snapshot(&original).expect("export");
    assert_eq!(artifact.file_name, EXPORT_FILE_NAME);
    assert_eq!(artifact.content_type, EXPORT_CONTENT_TYPE);
    assert!(artifact.bytes.starts_with(b"SQLite format 3\0"));

    let restored = import_snapshot(&runtime, &artifact.bytes).expect("import");
    assert_eq!(table_names(&restored), table_names(&original));

    let users = execute(&restored, "SELECT name FROM users ORDER BY id;").expect("select");
    assert_eq!(
        users.result.rows,
        vec![vec![Value::Text("Ada".into())], vec![Value::Text("Linus".into())]]
    );

    let listed = execute(&restored, LIST_TABLES_QUERY).expect("diagnostic");
    assert_eq!(listed.result.columns, vec!["name".to_string()]);
}

#[test]
fn export_does_not_change_the_database() {
    let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
    let db = runtime.new_instance(None).expect("new instance");
    execute(&db, "CREATE TABLE t (x); INSERT INTO t VALUES (1);").expect("seed");

    let first = export_snapshot(&db).expect("export").bytes;
    let second = export_snapshot(&db).expect("export").bytes;
    assert_eq!(first, second);
}

#[test]
fn imported_database_is_independent_of_its_source() {
    let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
    let source = runtime.new_instance(None).expect("new instance");
    execute(&source, "CREATE TABLE t (x);").expect("seed");

    let copy = import_snapshot(&runtime, &export_snapshot(&source).expect("export").bytes)
        .expect("import");
    execute(&copy, "INSERT INTO t VALUES (1);").expect("write to copy");

    let count = execute(&source, "SELECT count(*) FROM t;").expect("count");
    assert_eq!(count.result.rows, vec![vec![Value::Integer(0)]]);
}

#[tokio::test]
async fn wal_mode_database_file_can_be_imported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("shop.db");
    {
        let conn = rusqlite::Connection::open(&path).expect("open file db");
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .expect("enable wal");
        assert_eq!(mode, "wal");
        conn.execute_batch("CREATE TABLE items (id INTEGER); INSERT INTO items VALUES (5);")
            .expect("seed");
        // Closing the last connection checkpoints the WAL into the main file.
    }

    let bytes = read_snapshot_file(&path).await.expect("read file");
    assert_eq!(bytes[18], 2, "header should advertise WAL mode");

    let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
    let db = import_snapshot(&runtime, &bytes).expect("import wal image");
    let out = execute(&db, "SELECT id FROM items;").expect("select");
    assert_eq!(out.result.rows, vec![vec![Value::Integer(5)]]);
}

#[test]
fn empty_export_imports_as_empty_database() {
    let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
    let blank = runtime.new_instance(None).expect("new instance");
    let artifact = export_snapshot(&blank).expect("export");

    let db = import_snapshot(&runtime, &artifact.bytes).expect("import");
    assert!(table_names(&db).is_empty());
}
