use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sqlpad_storage::EngineOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::render::RenderOptions;

/// Query run against a fresh database at startup, and the initial editor text.
pub const DEFAULT_SEED_QUERY: &str = "SELECT sqlite_version();";
const STORE_FILE_NAME: &str = "saved-queries.json";
const HISTORY_FILE_NAME: &str = "history.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What happens to the live database when an import fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFailurePolicy {
    /// The previous database is only closed once the new image loaded.
    #[default]
    KeepPrevious,
    /// The previous database is closed before the new image is read; a failed
    /// import leaves the session without a database.
    DiscardPrevious,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WorkbenchConfig {
    pub engine: EngineOptions,
    pub seed_query: String,
    pub import_failure: ImportFailurePolicy,
    pub render: RenderOptions,
    /// Where saved queries are kept. `None` means [`default_store_path`].
    pub store_path: Option<PathBuf>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            seed_query: DEFAULT_SEED_QUERY.to_string(),
            import_failure: ImportFailurePolicy::default(),
            render: RenderOptions::default(),
            store_path: None,
        }
    }
}

impl WorkbenchConfig {
    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The configured store path, falling back to the per-user data directory.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path.clone().or_else(default_store_path)
    }
}

/// `<data_local_dir>/saved-queries.json`, or `None` when the platform has no
/// home directory.
pub fn default_store_path() -> Option<PathBuf> {
    data_file(STORE_FILE_NAME)
}

/// REPL line history, kept next to the default saved-query file.
pub fn default_history_path() -> Option<PathBuf> {
    data_file(HISTORY_FILE_NAME)
}

fn data_file(name: &str) -> Option<PathBuf> {
    let proj = ProjectDirs::from("dev", "sqlpad", "SQLPad")?;
    Some(proj.data_local_dir().join(name))
}
