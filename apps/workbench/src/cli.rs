//! Command-line front end: one-shot execution and the interactive REPL.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, info, warn};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{CompletionType, Config, EditMode, Editor, Helper};
use sqlpad_storage::{
    is_complete_statement, FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore,
    EXPORT_FILE_NAME, LIST_TABLES_QUERY,
};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::{default_history_path, WorkbenchConfig};
use crate::render::{
    render_error, render_errors_pane, render_json_error, render_json_result, render_result,
    render_results_pane, render_timing, RenderOptions,
};
use crate::session::{RunStatus, Session, SessionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "sqlpad",
    version,
    about = "Run SQL against an in-memory SQLite database, import and export database files, and keep named queries."
)]
pub struct Args {
    /// Database file to import at startup (.sqlite, .db or .sqlite3).
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Saved-query file (default: the per-user data directory).
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Keep saved queries in memory only.
    #[arg(long, conflicts_with = "store")]
    pub no_store: bool,

    /// JSON config file. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format for query results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Show at most this many rows per result.
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// SQL to run instead of starting the REPL (repeatable, runs in order).
    #[arg(short = 'e', long = "execute")]
    pub execute: Vec<String>,

    /// SQL script files to run after any `-e` input (repeatable, runs in order).
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Write the final database to this path (a directory receives `database.sqlite`).
    #[arg(long)]
    pub export: Option<PathBuf>,
}

impl Args {
    /// Config file values with command-line overrides applied.
    pub fn resolve_config(&self) -> Result<WorkbenchConfig> {
        let mut config = match &self.config {
            Some(path) => WorkbenchConfig::load(path)?,
            None => WorkbenchConfig::default(),
        };
        if let Some(store) = &self.store {
            config.store_path = Some(store.clone());
        }
        if let Some(max_rows) = self.max_rows {
            config.render.max_rows = Some(max_rows);
        }
        Ok(config)
    }

    pub fn open_backend(&self, config: &WorkbenchConfig) -> Arc<dyn KeyValueStore> {
        if self.no_store {
            return Arc::new(InMemoryKeyValueStore::new());
        }
        match config.resolved_store_path() {
            Some(path) => {
                let store = FileKeyValueStore::new(path);
                info!("saved queries at {}", store.path().display());
                Arc::new(store)
            }
            None => {
                warn!("no data directory available; saved queries will not persist");
                Arc::new(InMemoryKeyValueStore::new())
            }
        }
    }
}

/// Run the CLI to completion. Startup failures print their message and exit 1.
pub async fn run(args: Args) -> Result<ExitCode> {
    let config = args.resolve_config()?;
    let backend = args.open_backend(&config);
    let session = Session::start(config, backend).await;

    if let SessionState::Failed(message) = session.state() {
        eprintln!("{message}");
        return Ok(ExitCode::FAILURE);
    }

    if let Some(path) = &args.db {
        if let Err(err) = session.import_file(path).await {
            eprintln!("{}", render_error(&err.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    }

    let stdout = std::io::stdout();

    let mut failed = false;
    if args.execute.is_empty() && args.files.is_empty() {
        let repl = Repl::new(&session, args.format);
        if std::io::stdin().is_terminal() {
            let history = if args.no_store {
                None
            } else {
                default_history_path()
            };
            repl.interactive(history.as_deref()).await?;
        } else {
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            repl.drive(input, &mut stdout.lock()).await?;
        }
    } else {
        let mut out = stdout.lock();
        let mut scripts = args.execute.clone();
        for path in &args.files {
            let sql = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read SQL file {}", path.display()))?;
            scripts.push(sql);
        }

        for sql in scripts {
            session.set_query(sql);
            let status = session.run().await?;
            print_outcome(&session, status, args.format, &mut out)?;
            failed |= status == RunStatus::Failed;
        }
    }

    if let Some(path) = &args.export {
        export_to(&session, path, &mut stdout.lock()).await?;
    }

    session.close()?;
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn render_options(session: &Session) -> &RenderOptions {
    &session.config().render
}

/// Print the panes after a run, in the requested format.
pub fn print_outcome(
    session: &Session,
    status: RunStatus,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    match (status, format) {
        (RunStatus::NoDatabase, OutputFormat::Text) => {
            writeln!(out, "No database loaded")?;
        }
        (RunStatus::NoDatabase, OutputFormat::Json) => {
            writeln!(out, "{}", render_json_error("no database loaded"))?;
        }
        (RunStatus::Failed, OutputFormat::Text) => {
            let message = session.error().unwrap_or_default();
            writeln!(out, "{}", render_error(&message))?;
        }
        (RunStatus::Failed, OutputFormat::Json) => {
            let message = session.error().unwrap_or_default();
            writeln!(out, "{}", render_json_error(&message))?;
        }
        (RunStatus::Succeeded, OutputFormat::Text) => {
            let result = session.result().unwrap_or_default();
            writeln!(out, "{}", render_result(&result, render_options(session)))?;
            if let Some(elapsed) = session.execution_time() {
                writeln!(out, "{}", render_timing(elapsed))?;
            }
        }
        (RunStatus::Succeeded, OutputFormat::Json) => {
            let result = session.result().unwrap_or_default();
            writeln!(out, "{}", render_json_result(&result, session.execution_time()))?;
        }
    }
    Ok(())
}

async fn export_to(session: &Session, path: &Path, out: &mut impl Write) -> Result<()> {
    match session.export_to(path).await? {
        Some(written) => writeln!(out, "Exported database to {}", written.display())?,
        None => writeln!(out, "No database loaded")?,
    }
    Ok(())
}

const HELP: &str = "\
SQL runs once the input forms a complete statement ending in ';'.

\\help            show this help
\\run             run the editor buffer again
\\show            print the editor buffer
\\result          show the results pane
\\errors          show the errors pane
\\import PATH     replace the database with a .sqlite/.db/.sqlite3 file
\\export [PATH]   write the database (default: ./database.sqlite)
\\save NAME       save the editor buffer as NAME
\\load NAME       load saved query NAME into the editor
\\queries         list saved queries
\\samples         list sample queries
\\sample N        load sample query N into the editor
\\tables          list tables
\\quit            exit";

const META_COMMANDS: &[&str] = &[
    "\\help", "\\run", "\\show", "\\result", "\\errors", "\\import", "\\export", "\\save",
    "\\load", "\\queries", "\\samples", "\\sample", "\\tables", "\\quit",
];

const PROMPT: &str = "sqlpad> ";
const CONTINUATION_PROMPT: &str = "   ...> ";

/// Whether the editor should submit `input` rather than start a new line.
fn input_is_complete(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.is_empty() || trimmed.starts_with('\\') || is_complete_statement(input)
}

/// Line editor support: meta-command completion, history hints, and
/// multi-line entry until a statement is complete.
struct SqlHelper {
    hinter: HistoryHinter,
}

impl SqlHelper {
    fn new() -> Self {
        Self {
            hinter: HistoryHinter::new(),
        }
    }
}

impl Completer for SqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let head = &line[..pos];
        if !head.starts_with('\\') || head.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let matches = META_COMMANDS
            .iter()
            .filter(|command| command.starts_with(head))
            .map(|command| Pair {
                display: command.to_string(),
                replacement: command.to_string(),
            })
            .collect();
        Ok((0, matches))
    }
}

impl Hinter for SqlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &rustyline::Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for SqlHelper {}

impl Validator for SqlHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        Ok(if input_is_complete(ctx.input()) {
            ValidationResult::Valid(None)
        } else {
            ValidationResult::Incomplete
        })
    }
}

impl Helper for SqlHelper {}

/// Line-oriented driver over a [`Session`].
pub struct Repl<'a> {
    session: &'a Session,
    format: OutputFormat,
}

enum Flow {
    Continue,
    Quit,
}

impl<'a> Repl<'a> {
    pub fn new(session: &'a Session, format: OutputFormat) -> Self {
        Self { session, format }
    }

    /// Read piped input until EOF or `\quit`.
    pub async fn drive<R, W>(&self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut buffer = String::new();

        while let Some(line) = lines.next_line().await.context("read input")? {
            if let Flow::Quit = self.feed(&mut buffer, &line, out).await? {
                return Ok(());
            }
        }
        self.finish(buffer, out).await
    }

    /// Interactive terminal loop with line editing and history.
    pub async fn interactive(&self, history: Option<&Path>) -> Result<()> {
        let config = Config::builder()
            .auto_add_history(false)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .build();
        let mut editor = Editor::<SqlHelper, DefaultHistory>::with_config(config)
            .context("start line editor")?;
        editor.set_helper(Some(SqlHelper::new()));
        if let Some(path) = history {
            if let Err(err) = editor.load_history(path) {
                debug!("no history loaded from {}: {err}", path.display());
            }
        }

        let stdout = std::io::stdout();
        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            // The editor blocks on the terminal; keep the runtime's other workers free.
            match tokio::task::block_in_place(|| editor.readline(prompt)) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        editor.add_history_entry(line.as_str())?;
                    }
                    if let Flow::Quit = self.feed(&mut buffer, &line, &mut stdout.lock()).await? {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => buffer.clear(),
                Err(ReadlineError::Eof) => {
                    self.finish(std::mem::take(&mut buffer), &mut stdout.lock())
                        .await?;
                    break;
                }
                Err(err) => return Err(err).context("read input"),
            }
        }

        if let Some(path) = history {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            if let Err(err) = editor.save_history(path) {
                warn!("failed to save history to {}: {err}", path.display());
            }
        }
        Ok(())
    }

    /// Handle one chunk of input: a meta command, or SQL that accumulates in
    /// `buffer` until SQLite considers it a complete statement.
    async fn feed(&self, buffer: &mut String, input: &str, out: &mut impl Write) -> Result<Flow> {
        let trimmed = input.trim();
        if buffer.is_empty() {
            if trimmed.starts_with('\\') {
                return self.command(trimmed, out).await;
            }
            if trimmed.is_empty() {
                return Ok(Flow::Continue);
            }
        } else {
            buffer.push('\n');
        }
        buffer.push_str(input);

        if is_complete_statement(buffer) {
            self.session.set_query(std::mem::take(buffer));
            self.run_editor(out).await?;
        }
        Ok(Flow::Continue)
    }

    /// Run whatever is left once input ends, even without a closing `;`.
    async fn finish(&self, buffer: String, out: &mut impl Write) -> Result<()> {
        if !buffer.trim().is_empty() {
            self.session.set_query(buffer);
            self.run_editor(out).await?;
        }
        Ok(())
    }

    async fn run_editor(&self, out: &mut impl Write) -> Result<()> {
        let status = self.session.run().await?;
        print_outcome(self.session, status, self.format, out)
    }

    async fn command(&self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "\\q" | "\\quit" => return Ok(Flow::Quit),
            "\\help" | "\\?" => writeln!(out, "{HELP}")?,
            "\\run" => self.run_editor(out).await?,
            "\\show" => writeln!(out, "{}", self.session.query())?,
            "\\result" => {
                let result = self.session.result();
                let options = render_options(self.session);
                writeln!(out, "{}", render_results_pane(result.as_ref(), options))?;
            }
            "\\errors" => {
                let error = self.session.error();
                writeln!(out, "{}", render_errors_pane(error.as_deref()))?;
            }
            "\\tables" => {
                let status = self.session.run_sql(LIST_TABLES_QUERY).await?;
                print_outcome(self.session, status, self.format, out)?;
            }
            "\\import" if arg.is_empty() => writeln!(out, "usage: \\import PATH")?,
            "\\import" => match self.session.import_file(Path::new(arg)).await {
                Ok(()) => {
                    writeln!(out, "Imported {arg}")?;
                    print_outcome(self.session, RunStatus::Succeeded, self.format, out)?;
                }
                Err(err) => writeln!(out, "{}", render_error(&err.to_string()))?,
            },
            "\\export" => {
                let path = if arg.is_empty() { EXPORT_FILE_NAME } else { arg };
                if let Err(err) = export_to(self.session, Path::new(path), out).await {
                    writeln!(out, "{}", render_error(&format!("{err:#}")))?;
                }
            }
            "\\save" => match self.session.save_query(arg) {
                Ok(true) => writeln!(out, "Saved query \"{arg}\"")?,
                Ok(false) => writeln!(out, "usage: \\save NAME")?,
                Err(err) => writeln!(out, "{}", render_error(&err.to_string()))?,
            },
            "\\load" => {
                if self.session.load_saved_query(arg) {
                    writeln!(out, "{}", self.session.query())?;
                } else {
                    writeln!(out, "No saved query named \"{arg}\"")?;
                }
            }
            "\\queries" => {
                let saved = self.session.saved_queries();
                if saved.is_empty() {
                    writeln!(out, "No saved queries")?;
                }
                for entry in saved {
                    writeln!(out, "{}: {}", entry.name, entry.query.replace('\n', " "))?;
                }
            }
            "\\samples" => {
                for (idx, sample) in self.session.samples().iter().enumerate() {
                    writeln!(out, "{}. {}", idx + 1, sample.name)?;
                }
            }
            "\\sample" => {
                let loaded = arg
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .is_some_and(|idx| self.session.load_sample(idx));
                if loaded {
                    writeln!(out, "{}", self.session.query())?;
                } else {
                    writeln!(out, "usage: \\sample N (see \\samples)")?;
                }
            }
            other => writeln!(out, "Unknown command {other}; try \\help")?,
        }
        Ok(Flow::Continue)
    }
}
