//! Embedded SQLite plumbing for the SQLPad workbench.
//!
//! Everything here is synchronous and UI-agnostic. It exposes:
//! - An engine runtime that hands out in-memory database handles
//! - A query execution adapter that normalizes engine output for display
//! - Snapshot import/export of whole database images
//! - A saved-query store over a pluggable key-value backend

pub mod engine;
pub mod exec;
pub mod kv;
pub mod saved_queries;
pub mod snapshot;
mod types;

pub use engine::{is_complete_statement, EngineError, EngineHandle, EngineOptions, EngineRuntime};
pub use exec::{execute, ExecutionError, TimedResult};
pub use kv::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueError, KeyValueStore};
pub use saved_queries::{SavedQueryStore, StoreError, SAVED_QUERIES_KEY};
pub use snapshot::{
    export_snapshot, import_snapshot, is_importable_path, read_snapshot_file, ExportArtifact,
    ImportError, EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME, IMPORT_EXTENSIONS, LIST_TABLES_QUERY,
};
pub use types::{QueryResult, ResultKind, ResultSet, SavedQuery, Value};
