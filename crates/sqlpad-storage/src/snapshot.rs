use crate::engine::{EngineError, EngineHandle, EngineRuntime};
use log::info;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name offered for every export.
pub const EXPORT_FILE_NAME: &str = "database.sqlite";
/// MIME type attached to every export.
pub const EXPORT_CONTENT_TYPE: &str = "application/x-sqlite3";
/// Extensions (lowercase, without the dot) accepted for import.
pub const IMPORT_EXTENSIONS: [&str; 3] = ["sqlite", "db", "sqlite3"];
/// Diagnostic run after a successful import.
pub const LIST_TABLES_QUERY: &str = "SELECT name FROM sqlite_master WHERE type='table';";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to import database: {0}")]
    Engine(#[from] EngineError),
    #[error("Failed to import database: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to import database: unsupported file type {}", .0.display())]
    UnsupportedExtension(PathBuf),
}

/// A downloadable copy of the current database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Write the image to `path`, or to `path/database.sqlite` when `path` is a
    /// directory. Returns the file actually written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = path.as_ref();
        let dest = if path.is_dir() {
            path.join(self.file_name)
        } else {
            path.to_path_buf()
        };
        sqlpad_fs::write_atomic(&dest, &self.bytes)?;
        info!("exported {} bytes to {}", self.bytes.len(), dest.display());
        Ok(dest)
    }
}

/// Build a new handle seeded from a database image.
///
/// The caller decides what happens to the handle being replaced.
pub fn import_snapshot(runtime: &EngineRuntime, bytes: &[u8]) -> Result<EngineHandle, ImportError> {
    let handle = runtime.new_instance(Some(bytes))?;
    info!("imported database image ({} bytes)", bytes.len());
    Ok(handle)
}

/// Serialize the live database. The handle is not modified.
pub fn export_snapshot(handle: &EngineHandle) -> Result<ExportArtifact, EngineError> {
    let bytes = handle.export()?;
    Ok(ExportArtifact {
        file_name: EXPORT_FILE_NAME,
        content_type: EXPORT_CONTENT_TYPE,
        bytes,
    })
}

pub fn is_importable_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMPORT_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

/// Read a database file for import, refusing extensions the picker would hide.
pub async fn read_snapshot_file(path: &Path) -> Result<Vec<u8>, ImportError> {
    if !is_importable_path(path) {
        return Err(ImportError::UnsupportedExtension(path.to_path_buf()));
    }
    Ok(tokio::fs::read(path).await?)
}
