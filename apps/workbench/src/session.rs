//! The workbench session: one live database, one editor buffer, and the
//! panes that show the outcome of the latest operation.
//!
//! A [`Session`] is shared by reference (or `Arc`) between whatever drives it.
//! At most one engine operation (run, import, export) is in flight at a time;
//! a second request made meanwhile fails with [`SessionError::Busy`].

use log::{debug, info, warn};
use sqlpad_storage::{
    export_snapshot, import_snapshot, read_snapshot_file, EngineError, EngineHandle,
    EngineRuntime, ExecutionError, ExportArtifact, ImportError, KeyValueStore, QueryResult,
    SavedQuery, SavedQueryStore, StoreError, TimedResult, LIST_TABLES_QUERY,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ImportFailurePolicy, WorkbenchConfig};
use crate::samples::{SampleQuery, SAMPLE_QUERIES};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another operation is already running")]
    Busy,
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    Executing,
    Importing,
    /// Startup failed; carries the user-facing message. Terminal.
    Failed(String),
}

/// Which output pane is in front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Results,
    Errors,
}

/// Outcome of a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// The engine rejected the SQL; see [`Session::error`].
    Failed,
    /// There is no live database, so nothing ran.
    NoDatabase,
}

#[derive(Debug)]
struct Panes {
    state: SessionState,
    handle: Option<EngineHandle>,
    query: String,
    result: Option<QueryResult>,
    error: Option<String>,
    execution_time: Option<Duration>,
    active_pane: Pane,
}

impl Panes {
    fn settle(&mut self) {
        if !matches!(self.state, SessionState::Failed(_)) {
            self.state = SessionState::Ready;
        }
    }

    fn begin_run(&mut self) {
        self.error = None;
        self.result = None;
        self.active_pane = Pane::Results;
    }

    fn apply(&mut self, outcome: Result<TimedResult, ExecutionError>) -> RunStatus {
        match outcome {
            Ok(TimedResult { result, elapsed }) => {
                self.result = Some(result);
                self.execution_time = Some(elapsed);
                RunStatus::Succeeded
            }
            Err(err) => {
                self.error = Some(err.message);
                self.execution_time = None;
                self.active_pane = Pane::Errors;
                RunStatus::Failed
            }
        }
    }
}

/// Clears the busy flag when an operation ends, however it ends.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Session {
    config: WorkbenchConfig,
    runtime: Option<EngineRuntime>,
    busy: AtomicBool,
    panes: Mutex<Panes>,
    store: Mutex<SavedQueryStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Session {
    /// Load saved queries, bring up the engine with an empty database and run
    /// the seed query.
    ///
    /// Engine failures do not make this return an error: the session comes back
    /// in [`SessionState::Failed`] with no database.
    pub async fn start(config: WorkbenchConfig, backend: Arc<dyn KeyValueStore>) -> Self {
        let store = SavedQueryStore::load(backend);
        let mut panes = Panes {
            state: SessionState::Initializing,
            handle: None,
            query: config.seed_query.clone(),
            result: None,
            error: None,
            execution_time: None,
            active_pane: Pane::Results,
        };

        let engine_options = config.engine.clone();
        let seed_query = config.seed_query.clone();
        let started = tokio::task::spawn_blocking(move || {
            let runtime = EngineRuntime::load(engine_options)?;
            let handle = runtime.new_instance(None)?;
            let seeded = sqlpad_storage::execute(&handle, &seed_query);
            Ok::<_, EngineError>((runtime, handle, seeded))
        })
        .await;

        let runtime = match started {
            Ok(Ok((runtime, handle, seeded))) => {
                panes.handle = Some(handle);
                panes.apply(seeded);
                panes.state = SessionState::Ready;
                info!("session ready (sqlite {})", runtime.version());
                Some(runtime)
            }
            Ok(Err(err)) => {
                panes.state = startup_failure(&err);
                None
            }
            Err(err) => {
                panes.state = startup_failure(&err);
                None
            }
        };

        Self {
            config,
            runtime,
            busy: AtomicBool::new(false),
            panes: Mutex::new(panes),
            store: Mutex::new(store),
        }
    }

    fn begin(&self, operation: &str) -> Result<BusyGuard<'_>, SessionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("rejected {operation}: session busy");
            return Err(SessionError::Busy);
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    /// Move from `Ready` into a working state and hand back the live handle.
    fn enter(&self, working: SessionState) -> Option<EngineHandle> {
        let mut panes = lock(&self.panes);
        let handle = panes.handle.clone()?;
        panes.state = working;
        Some(handle)
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    /// Run the editor buffer.
    pub async fn run(&self) -> Result<RunStatus, SessionError> {
        let sql = self.query();
        self.run_sql(&sql).await
    }

    /// Run arbitrary SQL without touching the editor buffer.
    pub async fn run_sql(&self, sql: &str) -> Result<RunStatus, SessionError> {
        let _busy = self.begin("run")?;
        let Some(handle) = self.enter(SessionState::Executing) else {
            debug!("run ignored: no database");
            return Ok(RunStatus::NoDatabase);
        };
        lock(&self.panes).begin_run();

        let sql = sql.to_string();
        let outcome =
            tokio::task::spawn_blocking(move || sqlpad_storage::execute(&handle, &sql)).await;

        let mut panes = lock(&self.panes);
        panes.settle();
        Ok(panes.apply(outcome?))
    }

    /// Replace the live database with `bytes`.
    ///
    /// The message of a failed import is also shown in the error pane.
    pub async fn import_bytes(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let _busy = self.begin("import")?;
        self.import_locked(bytes).await
    }

    /// Read a `.sqlite`, `.db` or `.sqlite3` file and import it.
    pub async fn import_file(&self, path: &Path) -> Result<(), SessionError> {
        let _busy = self.begin("import")?;
        match read_snapshot_file(path).await {
            Ok(bytes) => self.import_locked(bytes).await,
            Err(err) => Err(self.import_failed(err)),
        }
    }

    async fn import_locked(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let Some(runtime) = self.runtime.clone() else {
            return Err(self.startup_error());
        };

        let discarded = {
            let mut panes = lock(&self.panes);
            panes.state = SessionState::Importing;
            match self.config.import_failure {
                ImportFailurePolicy::KeepPrevious => None,
                ImportFailurePolicy::DiscardPrevious => panes.handle.take(),
            }
        };
        if let Some(old) = discarded {
            close_quietly(old);
        }

        let imported = tokio::task::spawn_blocking(move || {
            let handle = import_snapshot(&runtime, &bytes)?;
            let tables = sqlpad_storage::execute(&handle, LIST_TABLES_QUERY);
            Ok::<_, ImportError>((handle, tables))
        })
        .await;

        let (handle, tables) = match imported {
            Ok(Ok(imported)) => imported,
            Ok(Err(err)) => return Err(self.import_failed(err)),
            Err(err) => {
                let mut panes = lock(&self.panes);
                panes.settle();
                return Err(err.into());
            }
        };

        let previous = {
            let mut panes = lock(&self.panes);
            let previous = panes.handle.replace(handle);
            panes.begin_run();
            panes.apply(tables);
            panes.error = None;
            panes.settle();
            previous
        };
        if let Some(old) = previous {
            close_quietly(old);
        }
        Ok(())
    }

    fn import_failed(&self, err: ImportError) -> SessionError {
        warn!("{err}");
        let mut panes = lock(&self.panes);
        panes.error = Some(err.to_string());
        panes.active_pane = Pane::Errors;
        panes.settle();
        err.into()
    }

    fn startup_error(&self) -> SessionError {
        match self.state() {
            SessionState::Failed(message) => SessionError::Failed(message),
            other => SessionError::Failed(format!("engine unavailable ({other:?})")),
        }
    }

    /// Serialize the live database, or `None` when there is none.
    pub async fn export(&self) -> Result<Option<ExportArtifact>, SessionError> {
        let _busy = self.begin("export")?;
        let Some(handle) = lock(&self.panes).handle.clone() else {
            debug!("export ignored: no database");
            return Ok(None);
        };

        let artifact = tokio::task::spawn_blocking(move || export_snapshot(&handle)).await??;
        info!("exported database image ({} bytes)", artifact.bytes.len());
        Ok(Some(artifact))
    }

    /// Export and write to `path` (a file, or a directory to receive
    /// `database.sqlite`). Returns the written path.
    pub async fn export_to(&self, path: &Path) -> Result<Option<PathBuf>, SessionError> {
        let Some(artifact) = self.export().await? else {
            return Ok(None);
        };
        let path = path.to_path_buf();
        let written = tokio::task::spawn_blocking(move || artifact.write_to(&path)).await??;
        Ok(Some(written))
    }

    pub fn query(&self) -> String {
        lock(&self.panes).query.clone()
    }

    pub fn set_query(&self, text: impl Into<String>) {
        lock(&self.panes).query = text.into();
    }

    /// Save the editor buffer under `name`. `Ok(false)` means the name was blank.
    pub fn save_query(&self, name: &str) -> Result<bool, SessionError> {
        let query = self.query();
        Ok(lock(&self.store).save(name, &query)?)
    }

    /// Put the first saved query named `name` into the editor.
    pub fn load_saved_query(&self, name: &str) -> bool {
        let found = lock(&self.store).select(name).map(str::to_string);
        match found {
            Some(query) => {
                self.set_query(query);
                true
            }
            None => false,
        }
    }

    pub fn saved_queries(&self) -> Vec<SavedQuery> {
        lock(&self.store).entries().to_vec()
    }

    pub fn samples(&self) -> &'static [SampleQuery] {
        SAMPLE_QUERIES
    }

    pub fn load_sample(&self, index: usize) -> bool {
        match SAMPLE_QUERIES.get(index) {
            Some(sample) => {
                self.set_query(sample.query);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.panes).state.clone()
    }

    pub fn result(&self) -> Option<QueryResult> {
        lock(&self.panes).result.clone()
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.panes).error.clone()
    }

    pub fn execution_time(&self) -> Option<Duration> {
        lock(&self.panes).execution_time
    }

    pub fn active_pane(&self) -> Pane {
        lock(&self.panes).active_pane
    }

    pub fn has_database(&self) -> bool {
        lock(&self.panes).handle.is_some()
    }

    /// Close the live database. Later runs are no-ops.
    ///
    /// Like any other engine operation this fails with [`SessionError::Busy`]
    /// while a run, import or export is in flight.
    pub fn close(&self) -> Result<(), SessionError> {
        let _busy = self.begin("close")?;
        let handle = lock(&self.panes).handle.take();
        if let Some(handle) = handle {
            handle.close()?;
        }
        Ok(())
    }
}

fn startup_failure(detail: &dyn std::fmt::Display) -> SessionState {
    let message = format!("Failed to initialize SQLite: {detail}");
    warn!("{message}");
    SessionState::Failed(message)
}

fn close_quietly(handle: EngineHandle) {
    if let Err(err) = handle.close() {
        warn!("failed to close previous database: {err}");
    }
}
