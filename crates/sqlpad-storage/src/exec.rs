use crate::engine::{EngineError, EngineHandle};
use crate::types::QueryResult;
use log::debug;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A failed run. `message` is exactly what SQLite reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl From<EngineError> for ExecutionError {
    fn from(err: EngineError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// A successful run and how long the engine call took.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedResult {
    pub result: QueryResult,
    pub elapsed: Duration,
}

/// Run `sql` against `handle` and normalize the outcome for display.
///
/// Only the first result set group is kept. A script with no row-producing
/// statement yields [`QueryResult::empty`].
pub fn execute(handle: &EngineHandle, sql: &str) -> Result<TimedResult, ExecutionError> {
    let started = Instant::now();
    let groups = handle.execute(sql).map_err(|err| {
        debug!("statement failed: {err}");
        ExecutionError::from(err)
    })?;
    let elapsed = started.elapsed();

    let result = groups.into_iter().next().unwrap_or_default();
    Ok(TimedResult { result, elapsed })
}
