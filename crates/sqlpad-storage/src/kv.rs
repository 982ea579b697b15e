use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct KeyValueError(pub String);

impl KeyValueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Durable string-to-string persistence.
///
/// The saved-query store only ever touches one key; hosts pick where the
/// values live by implementing this trait.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError>;
}

#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::default();
        store.lock().insert(key.into(), value.into());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten in full on every `set`.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable store file is moved aside before being replaced.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    fn read_all(&self) -> Result<StoreFile, KeyValueError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::Parsed(BTreeMap::new()))
            }
            Err(err) => {
                return Err(KeyValueError::new(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        match serde_json::from_str(&raw) {
            Ok(map) => Ok(StoreFile::Parsed(map)),
            Err(err) => {
                warn!("ignoring malformed store file {}: {err}", self.path.display());
                Ok(StoreFile::Malformed)
            }
        }
    }
}

enum StoreFile {
    Parsed(BTreeMap<String, String>),
    Malformed,
}

impl StoreFile {
    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            StoreFile::Parsed(map) => map,
            StoreFile::Malformed => BTreeMap::new(),
        }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, KeyValueError> {
        Ok(self.read_all()?.into_map().remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KeyValueError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut map = match self.read_all()? {
            StoreFile::Parsed(map) => map,
            StoreFile::Malformed => {
                let backup = self.backup_path();
                std::fs::copy(&self.path, &backup).map_err(|err| {
                    KeyValueError::new(format!("failed to back up {}: {err}", self.path.display()))
                })?;
                warn!(
                    "replacing malformed store file {}; previous contents saved to {}",
                    self.path.display(),
                    backup.display()
                );
                BTreeMap::new()
            }
        };
        map.insert(key.to_string(), value.to_string());
        let json = serde_json::to_vec_pretty(&map).map_err(|err| KeyValueError::new(err.to_string()))?;
        sqlpad_fs::write_atomic(&self.path, &json).map_err(|err| {
            KeyValueError::new(format!("failed to write {}: {err}", self.path.display()))
        })
    }
}
