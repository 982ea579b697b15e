use crate::kv::{KeyValueError, KeyValueStore};
use crate::types::SavedQuery;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Key under which the whole collection is persisted as one JSON array.
pub const SAVED_QUERIES_KEY: &str = "savedQueries";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(#[from] KeyValueError),
}

/// Named queries, kept in insertion order and persisted on every save.
///
/// Duplicate names are allowed. Lookups resolve to the earliest entry.
pub struct SavedQueryStore {
    backend: Arc<dyn KeyValueStore>,
    entries: Vec<SavedQuery>,
}

impl fmt::Debug for SavedQueryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedQueryStore")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl SavedQueryStore {
    /// Read the persisted collection. Never fails: a missing, unreadable or
    /// malformed value starts an empty collection.
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let entries = match backend.get(SAVED_QUERIES_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<SavedQuery>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("ignoring malformed saved queries: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("failed to read saved queries: {err}");
                Vec::new()
            }
        };

        debug!("loaded {} saved queries", entries.len());
        Self { backend, entries }
    }

    /// Append `{name.trim(), query}` and persist the full collection.
    ///
    /// Returns `Ok(false)` without touching anything when the trimmed name is
    /// empty. On a persistence failure the append is undone.
    pub fn save(&mut self, name: &str, query: &str) -> Result<bool, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            debug!("refusing to save a query with an empty name");
            return Ok(false);
        }

        self.entries.push(SavedQuery {
            name: name.to_string(),
            query: query.to_string(),
        });

        if let Err(err) = self.persist() {
            self.entries.pop();
            return Err(err);
        }
        Ok(true)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.entries)?;
        self.backend.set(SAVED_QUERIES_KEY, &json)?;
        Ok(())
    }

    /// Query text of the first entry named exactly `name`.
    pub fn select(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.query.as_str())
    }

    pub fn entries(&self) -> &[SavedQuery] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
