#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sqlpad_storage::{execute, EngineOptions, EngineRuntime, QueryResult};

const MAX_SQL_BYTES: usize = 4 * 1024;

fn runtime() -> &'static EngineRuntime {
    static RUNTIME: OnceLock<EngineRuntime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        EngineRuntime::load(EngineOptions {
            memory_limit_bytes: Some(64 * 1024 * 1024),
            foreign_keys: true,
        })
        .expect("load sqlite runtime")
    })
}

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_SQL_BYTES)];
    let sql = String::from_utf8_lossy(data);

    let handle = runtime().new_instance(None).expect("open in-memory database");
    handle
        .execute("CREATE TABLE t (a INTEGER, b TEXT, c BLOB); INSERT INTO t VALUES (1, 'x', x'00');")
        .expect("seed schema");

    if let Ok(timed) = execute(&handle, &sql) {
        let QueryResult { columns, rows } = timed.result;
        // Every row the adapter hands out must line up with the declared columns.
        assert!(rows.iter().all(|row| row.len() == columns.len()));
    }

    let _ = handle.close();
});
