//! SQLPad workbench: a session controller over an in-memory SQLite database,
//! plus the text front end that drives it.

pub mod cli;
pub mod config;
pub mod render;
pub mod samples;
pub mod session;

pub use config::{default_store_path, ConfigError, ImportFailurePolicy, WorkbenchConfig};
pub use render::RenderOptions;
pub use samples::{SampleQuery, SAMPLE_QUERIES};
pub use session::{Pane, RunStatus, Session, SessionError, SessionState};
