#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sqlpad_storage::{execute, import_snapshot, EngineOptions, EngineRuntime, LIST_TABLES_QUERY};

/// Keep images small so each iteration stays fast; interesting header/page bugs show up well
/// below this size.
const MAX_IMAGE_BYTES: usize = 256 * 1024;

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
    if data.len() > MAX_IMAGE_BYTES {
        return;
    }

    // Arbitrary bytes must either be rejected or yield a usable database, never crash.
    let Ok(handle) = import_snapshot(runtime(), data) else {
        return;
    };
    let _ = execute(&handle, LIST_TABLES_QUERY);
    let _ = handle.export();
    let _ = handle.close();
});
