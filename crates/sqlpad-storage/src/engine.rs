use crate::types::{ResultSet, Value};
use log::{debug, info};
use rusqlite::serialize::OwnedData;
use rusqlite::{ffi, Batch, Connection, DatabaseName};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const HEADER_LEN: usize = 100;
/// Offsets of the file-format write/read version bytes (1 = rollback journal, 2 = WAL).
const WRITE_VERSION_OFFSET: usize = 18;
const READ_VERSION_OFFSET: usize = 19;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Any failure reported by SQLite.
    #[error("{}", sqlite_message(.0))]
    Sqlite(#[from] rusqlite::Error),
    /// SQLite could not open a connection at all.
    #[error("cannot open database ({0})")]
    Open(ffi::Error),
    /// `close` was called while other clones of the handle were alive.
    #[error("database is still in use")]
    InUse,
}

/// The message SQLite itself produced, without rusqlite's decoration
/// (offsets, echoed SQL).
fn sqlite_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        rusqlite::Error::SqlInputError { msg, .. } => msg.clone(),
        other => other.to_string(),
    }
}

/// Open failures carry the database path as their message; keep the cause.
fn open_in_memory() -> Result<Connection, EngineError> {
    Connection::open_in_memory().map_err(|err| match err {
        rusqlite::Error::SqliteFailure(code, _) => EngineError::Open(code),
        other => EngineError::Sqlite(other),
    })
}

/// Whether `sql` ends in a complete statement, judged by SQLite's tokenizer.
///
/// Semicolons inside string literals, quoted identifiers, comments and
/// trigger bodies do not end a statement.
pub fn is_complete_statement(sql: &str) -> bool {
    let Ok(sql) = CString::new(sql) else {
        // Interior NUL: let the engine report it.
        return true;
    };
    // SAFETY: `sql` is NUL-terminated and outlives the call.
    unsafe { ffi::sqlite3_complete(sql.as_ptr()) != 0 }
}

/// Options applied when the engine runtime is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineOptions {
    /// Upper bound on SQLite heap usage (default: 512MB). `None` leaves SQLite's default.
    pub memory_limit_bytes: Option<u64>,
    /// Enforce foreign key constraints on every handle (default: true).
    pub foreign_keys: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            memory_limit_bytes: Some(512 * 1024 * 1024),
            foreign_keys: true,
        }
    }
}

/// The loaded embedded engine. Produces [`EngineHandle`]s.
#[derive(Debug, Clone)]
pub struct EngineRuntime {
    options: EngineOptions,
    version: &'static str,
}

impl EngineRuntime {
    /// Check that the linked SQLite library is usable and apply runtime options.
    pub fn load(options: EngineOptions) -> Result<Self, EngineError> {
        let version = rusqlite::version();
        let conn = open_in_memory()?;

        if let Some(limit) = options.memory_limit_bytes {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            // The heap limit is process-wide; any connection can set it.
            let applied: i64 =
                conn.pragma_update_and_check(None, "hard_heap_limit", limit, |row| row.get(0))?;
            debug!("sqlite hard heap limit set to {applied} bytes");
        }

        conn.close().map_err(|(_, err)| err)?;
        info!("loaded sqlite {version}");

        Ok(Self { options, version })
    }

    /// The linked SQLite version, e.g. `3.46.0`.
    pub fn version(&self) -> &str {
        self.version
    }

    /// Open a fresh in-memory database, optionally seeded from a database image.
    ///
    /// The schema is read once before returning so an invalid image fails here
    /// rather than on the first user query.
    pub fn new_instance(&self, seed: Option<&[u8]>) -> Result<EngineHandle, EngineError> {
        let mut conn = open_in_memory()?;

        if let Some(bytes) = seed.filter(|bytes| !bytes.is_empty()) {
            let image = sqlite_owned_image(bytes)?;
            conn.deserialize(DatabaseName::Main, image, false)?;
        }

        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;

        // Bundled builds default foreign_keys to on, so the pragma is always applied.
        conn.pragma_update(None, "foreign_keys", self.options.foreign_keys)?;

        debug!(
            "opened in-memory database ({} seed bytes)",
            seed.map(<[u8]>::len).unwrap_or(0)
        );

        Ok(EngineHandle {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// A live in-memory database.
///
/// Clones share the same connection; the connection closes once the last clone
/// is dropped or [`EngineHandle::close`] is called on it.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    conn: Arc<Mutex<Connection>>,
}

impl EngineHandle {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run every statement in `sql`, in order.
    ///
    /// Statement splitting is left to SQLite. Each statement that declares
    /// result columns contributes one [`ResultSet`] (even with zero rows).
    /// The first failing statement aborts the script; statements before it
    /// stay applied.
    pub fn execute(&self, sql: &str) -> Result<Vec<ResultSet>, EngineError> {
        let conn = self.lock();
        let mut groups = Vec::new();
        let mut batch = Batch::new(&conn, sql);

        while let Some(mut stmt) = batch.next()? {
            let width = stmt.column_count();
            if width == 0 {
                stmt.execute([])?;
                continue;
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut cells = Vec::with_capacity(width);
                for idx in 0..width {
                    cells.push(Value::from(row.get_ref(idx)?));
                }
                rows.push(cells);
            }

            groups.push(ResultSet { columns, rows });
        }

        Ok(groups)
    }

    /// Serialize the `main` database to a byte image.
    pub fn export(&self) -> Result<Vec<u8>, EngineError> {
        let conn = self.lock();
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        if pages == 0 {
            // Nothing has been written yet; SQLite treats an empty image as an empty database.
            return Ok(Vec::new());
        }
        let data = conn.serialize(DatabaseName::Main)?;
        Ok(data.to_vec())
    }

    /// Close the connection, surfacing any error SQLite reports.
    ///
    /// Fails with [`EngineError::InUse`] while other clones of this handle are
    /// alive; the connection then closes once the last of them is dropped.
    pub fn close(self) -> Result<(), EngineError> {
        let Ok(mutex) = Arc::try_unwrap(self.conn) else {
            return Err(EngineError::InUse);
        };
        let conn = match mutex.into_inner() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        conn.close().map_err(|(_, err)| EngineError::Sqlite(err))?;
        debug!("closed in-memory database");
        Ok(())
    }
}

/// Copy `bytes` into a buffer allocated by SQLite, which `deserialize` takes
/// ownership of and frees with `sqlite3_free`. A WAL-mode header is rewritten
/// to rollback-journal mode on the copy.
fn sqlite_owned_image(bytes: &[u8]) -> Result<OwnedData, EngineError> {
    let len = bytes.len();
    // SAFETY: plain allocation; a null return is handled below.
    let raw = unsafe { ffi::sqlite3_malloc64(len as ffi::sqlite3_uint64) }.cast::<u8>();
    let Some(ptr) = NonNull::new(raw) else {
        return Err(EngineError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_NOMEM),
            None,
        )));
    };

    // SAFETY: `ptr` points to `len` freshly allocated bytes that nothing else
    // references, and `bytes` cannot overlap them.
    let image = unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), len);
        std::slice::from_raw_parts_mut(ptr.as_ptr(), len)
    };
    normalize_journal_mode(image);

    // SAFETY: the buffer came from `sqlite3_malloc64` and is exactly `len` bytes.
    Ok(unsafe { OwnedData::from_raw_nonnull(ptr, len) })
}

/// Rewrite a WAL-mode header to rollback-journal mode. Returns whether it did.
///
/// An in-memory image has no `-wal` file alongside it, and SQLite refuses to
/// read a WAL-flagged image without one.
fn normalize_journal_mode(image: &mut [u8]) -> bool {
    let is_wal = image.len() >= HEADER_LEN
        && image.starts_with(SQLITE_HEADER)
        && (image[WRITE_VERSION_OFFSET] == 2 || image[READ_VERSION_OFFSET] == 2);
    if is_wal {
        image[WRITE_VERSION_OFFSET] = 1;
        image[READ_VERSION_OFFSET] = 1;
    }
    is_wal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_versions(write: u8, read: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[..16].copy_from_slice(SQLITE_HEADER);
        bytes[WRITE_VERSION_OFFSET] = write;
        bytes[READ_VERSION_OFFSET] = read;
        bytes
    }

    #[test]
    fn wal_header_is_rewritten_to_rollback_mode() {
        let mut wal = header_with_versions(2, 2);
        assert!(normalize_journal_mode(&mut wal));
        assert_eq!(wal[WRITE_VERSION_OFFSET], 1);
        assert_eq!(wal[READ_VERSION_OFFSET], 1);
    }

    #[test]
    fn rollback_header_and_garbage_are_left_alone() {
        let mut legacy = header_with_versions(1, 1);
        assert!(!normalize_journal_mode(&mut legacy));

        let mut garbage = vec![2u8; 200];
        assert!(!normalize_journal_mode(&mut garbage));
        assert!(garbage.iter().all(|byte| *byte == 2));
    }

    #[test]
    fn seeded_instance_reads_an_exported_image() {
        let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
        let source = runtime.new_instance(None).expect("source");
        source
            .execute("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('kept');")
            .expect("seed");
        let image = source.export().expect("export");

        let copy = runtime.new_instance(Some(&image)).expect("seeded instance");
        let groups = copy.execute("SELECT v FROM t;").expect("select");
        assert_eq!(groups[0].rows, vec![vec![Value::Text("kept".into())]]);

        // The copy is writable and independent of the source.
        copy.execute("INSERT INTO t VALUES ('copy only');").expect("insert");
        let source_rows = source.execute("SELECT count(*) FROM t;").expect("count");
        assert_eq!(source_rows[0].rows, vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn completeness_follows_sqlite_tokenizer() {
        assert!(is_complete_statement("SELECT 1;"));
        assert!(is_complete_statement("SELECT 1;  \n"));
        assert!(!is_complete_statement("SELECT 1"));
        assert!(!is_complete_statement("INSERT INTO t VALUES ('a;"));
        assert!(is_complete_statement("INSERT INTO t VALUES ('a;\nb');"));
        assert!(!is_complete_statement("SELECT 1 -- trailing;"));
        assert!(!is_complete_statement(
            "CREATE TRIGGER tr AFTER INSERT ON t BEGIN DELETE FROM t;"
        ));
    }

    #[test]
    fn closing_a_shared_handle_reports_in_use() {
        let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
        let handle = runtime.new_instance(None).expect("new instance");
        let clone = handle.clone();

        assert!(matches!(handle.close(), Err(EngineError::InUse)));
        // The remaining clone is now the only owner and closes normally.
        clone.close().expect("close last clone");
    }

    #[test]
    fn error_display_is_the_bare_engine_message() {
        let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
        let handle = runtime.new_instance(None).expect("new instance");
        let err = handle.execute("SELEC 1;").expect_err("syntax error");
        assert_eq!(err.to_string(), "near \"SELEC\": syntax error");
    }

    #[test]
    fn default_options_cap_heap_and_enforce_foreign_keys() {
        let options = EngineOptions::default();
        assert_eq!(options.memory_limit_bytes, Some(536_870_912));
        assert!(options.foreign_keys);
    }

    #[test]
    fn fresh_instance_exports_empty_image() {
        let runtime = EngineRuntime::load(EngineOptions::default()).expect("load runtime");
        let handle = runtime.new_instance(None).expect("new instance");
        assert!(handle.export().expect("export").is_empty());
        handle.close().expect("close");
    }

    #[test]
    fn foreign_keys_follow_options() {
        for (enabled, expected) in [(false, 0), (true, 1)] {
            let runtime = EngineRuntime::load(EngineOptions {
                memory_limit_bytes: None,
                foreign_keys: enabled,
            })
            .expect("load runtime");
            let handle = runtime.new_instance(None).expect("new instance");
            let groups = handle.execute("PRAGMA foreign_keys;").expect("pragma");
            assert_eq!(groups[0].rows, vec![vec![Value::Integer(expected)]]);
        }
    }

    #[test]
    fn disabled_foreign_keys_allow_dangling_references() {
        let runtime = EngineRuntime::load(EngineOptions {
            memory_limit_bytes: None,
            foreign_keys: false,
        })
        .expect("load runtime");
        let handle = runtime.new_instance(None).expect("new instance");
        handle
            .execute(
                "CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));
                 INSERT INTO child VALUES (42);",
            )
            .expect("dangling insert is accepted");
    }
}
